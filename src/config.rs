//! Settings consumed by the voice coordinator and pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// User-facing voice settings: the master switch plus everything the
/// pipeline needs to come up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceSettings {
    /// Master on/off switch for voice triggers.
    pub enabled: bool,
    /// Preferred microphone, matched by display-name substring. `None`
    /// selects the host default device.
    #[serde(default)]
    pub microphone: Option<String>,
    /// Directory holding the recognition model.
    pub model_path: PathBuf,
}

impl VoiceSettings {
    #[must_use]
    pub fn recognition_config(&self) -> RecognitionConfig {
        RecognitionConfig {
            model_path: self.model_path.clone(),
            device_selector: self.microphone.clone(),
        }
    }
}

/// Start parameters handed to the speech pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionConfig {
    pub model_path: PathBuf,
    pub device_selector: Option<String>,
}
