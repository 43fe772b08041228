//! Capture-device enumeration and selector resolution.

use cpal::traits::{DeviceTrait, HostTrait};
use tracing::{debug, warn};

use super::capture::CaptureError;

/// One capture device as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicrophoneDevice {
    /// Position in the host's enumeration order (what the OS exposes as the
    /// device index).
    pub id: String,
    pub display_name: String,
}

/// Lists active capture devices. Enumeration failures log and yield an
/// empty list rather than an error — a machine without microphones is a
/// configuration, not a fault.
#[must_use = "an empty list means no microphone can be selected"]
pub fn list_microphones() -> Vec<MicrophoneDevice> {
    let host = cpal::default_host();
    match host.input_devices() {
        Ok(devices) => devices
            .enumerate()
            .filter_map(|(index, device)| {
                let display_name = device.name().ok()?;
                Some(MicrophoneDevice {
                    id: index.to_string(),
                    display_name,
                })
            })
            .collect(),
        Err(err) => {
            warn!(%err, "failed to enumerate capture devices");
            Vec::new()
        }
    }
}

/// Resolves a selector to a concrete device: case-insensitive display-name
/// substring match, falling back to the host default when the selector is
/// empty or unmatched. Fails only when nothing at all is available.
pub(crate) fn resolve_input_device(selector: Option<&str>) -> Result<cpal::Device, CaptureError> {
    let host = cpal::default_host();
    if let Some(pattern) = selector.map(str::trim).filter(|pattern| !pattern.is_empty()) {
        let wanted = pattern.to_lowercase();
        let matched = host
            .input_devices()
            .map_err(|err| CaptureError::Enumerate(err.to_string()))?
            .find(|device| {
                device
                    .name()
                    .map(|name| name.to_lowercase().contains(&wanted))
                    .unwrap_or(false)
            });
        match matched {
            Some(device) => return Ok(device),
            None => {
                debug!(selector = pattern, "no capture device matched; using host default")
            }
        }
    }
    host.default_input_device().ok_or(CaptureError::NoDevice)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Device availability varies by machine; these tests only pin the
    // shapes that hold everywhere.

    #[test]
    fn list_microphones_does_not_panic_and_ids_are_indices() {
        let devices = list_microphones();
        for (index, device) in devices.iter().enumerate() {
            assert_eq!(device.id, index.to_string());
            assert!(!device.display_name.is_empty());
        }
    }

    #[test]
    fn blank_selector_is_treated_as_absent() {
        let named = resolve_input_device(Some("   "));
        let default = resolve_input_device(None);
        assert_eq!(named.is_ok(), default.is_ok());
    }
}
