//! Owns the microphone stream and delivers PCM frames to the recognition path.
//!
//! `cpal` streams are not `Send`, so the stream lives on a dedicated worker
//! thread that parks until stop and drops the stream before exiting. Frames
//! arrive on `cpal`'s callback thread already converted to 16-bit mono PCM.
//! A joined worker is the guarantee that no further frames will be
//! delivered.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Sample, SampleFormat, SampleRate, SizedSample, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use super::devices::resolve_input_device;

/// Rate the recognizer prefers. Devices that cannot do 16 kHz keep their
/// default shape and the negotiated rate is handed to the engine instead of
/// resampling.
pub const TARGET_SAMPLE_RATE_HZ: u32 = 16_000;

const STOP_POLL_MS: u64 = 50;
const WORKER_JOIN_POLL_MS: u64 = 5;
const WORKER_JOIN_TIMEOUT_MS: u64 = 2_000;
const OPEN_ACK_TIMEOUT_MS: u64 = 5_000;

/// Consumer of captured frames; invoked on the capture callback thread and
/// must therefore return quickly — it back-pressures the audio hardware.
pub type FrameSink = Box<dyn FnMut(&[i16]) + Send + 'static>;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no capture device is available")]
    NoDevice,
    #[error("failed to enumerate capture devices: {0}")]
    Enumerate(String),
    #[error("capture device '{device}' has no usable input configuration: {reason}")]
    Unsupported { device: String, reason: String },
    #[error("failed to open capture device '{device}': {reason}")]
    Open { device: String, reason: String },
    #[error("failed to start capture stream on '{device}': {reason}")]
    Start { device: String, reason: String },
}

/// Resolved device plus negotiated stream shape.
///
/// Produced before any hardware acquisition so callers can learn the sample
/// rate (the recognizer needs it at construction) without holding the
/// device open.
pub struct CapturePlan {
    device: cpal::Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    device_name: String,
}

impl CapturePlan {
    /// Resolves the selector and negotiates a stream shape, preferring
    /// 16 kHz and falling back to the device default.
    pub fn resolve(selector: Option<&str>) -> Result<Self, CaptureError> {
        let device = resolve_input_device(selector)?;
        let device_name = device.name().unwrap_or_else(|_| "<unknown>".to_string());

        let preferred = device
            .supported_input_configs()
            .map_err(|err| CaptureError::Unsupported {
                device: device_name.clone(),
                reason: err.to_string(),
            })?
            .find(|range| {
                range.channels() >= 1
                    && range.min_sample_rate() <= SampleRate(TARGET_SAMPLE_RATE_HZ)
                    && SampleRate(TARGET_SAMPLE_RATE_HZ) <= range.max_sample_rate()
            });

        let (config, sample_format) = match preferred {
            Some(range) => {
                let sample_format = range.sample_format();
                let config: StreamConfig = range
                    .with_sample_rate(SampleRate(TARGET_SAMPLE_RATE_HZ))
                    .into();
                (config, sample_format)
            }
            None => {
                let default =
                    device
                        .default_input_config()
                        .map_err(|err| CaptureError::Unsupported {
                            device: device_name.clone(),
                            reason: err.to_string(),
                        })?;
                warn!(
                    device = %device_name,
                    rate = default.sample_rate().0,
                    channels = default.channels(),
                    "16 kHz capture not supported; using device default shape"
                );
                let sample_format = default.sample_format();
                (default.into(), sample_format)
            }
        };

        Ok(Self {
            device,
            config,
            sample_format,
            device_name,
        })
    }

    #[must_use = "the recognizer must be created with this rate"]
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    #[must_use]
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Opens the stream and begins delivering frames into `sink`.
    ///
    /// Returns only after the worker confirms the device is live, so a
    /// successful return means the capture session is actually running.
    pub fn open(self, sink: FrameSink) -> Result<CaptureSession, CaptureError> {
        let device_name = self.device_name.clone();
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (ready_tx, ready_rx) = bounded::<Result<(), CaptureError>>(1);

        let worker = thread::Builder::new()
            .name("voxlaunch-capture".to_string())
            .spawn(move || run_capture_worker(self, sink, &ready_tx, &stop_rx))
            .map_err(|err| CaptureError::Start {
                device: device_name.clone(),
                reason: format!("failed to spawn capture worker: {err}"),
            })?;

        match ready_rx.recv_timeout(Duration::from_millis(OPEN_ACK_TIMEOUT_MS)) {
            Ok(Ok(())) => {
                debug!(device = %device_name, "capture session open");
                Ok(CaptureSession {
                    stop_tx,
                    worker: Some(worker),
                    device_name,
                })
            }
            Ok(Err(err)) => {
                join_worker_with_timeout(worker);
                Err(err)
            }
            Err(_) => {
                let _ = stop_tx.try_send(());
                join_worker_with_timeout(worker);
                Err(CaptureError::Start {
                    device: device_name,
                    reason: "capture worker did not confirm stream start".to_string(),
                })
            }
        }
    }
}

/// One open microphone stream. Exactly one session exists at a time; the
/// pipeline enforces that by owning it exclusively.
pub struct CaptureSession {
    stop_tx: Sender<()>,
    worker: Option<JoinHandle<()>>,
    device_name: String,
}

impl CaptureSession {
    /// Stops the stream and joins the worker. Idempotent; after return no
    /// further frames are delivered.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = self.stop_tx.try_send(());
        join_worker_with_timeout(worker);
        debug!(device = %self.device_name, "capture session stopped");
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_capture_worker(
    plan: CapturePlan,
    sink: FrameSink,
    ready_tx: &Sender<Result<(), CaptureError>>,
    stop_rx: &Receiver<()>,
) {
    let stream = match build_capture_stream(&plan, sink) {
        Ok(stream) => stream,
        Err(err) => {
            let _ = ready_tx.send(Err(err));
            return;
        }
    };
    if let Err(err) = stream.play() {
        let _ = ready_tx.send(Err(CaptureError::Start {
            device: plan.device_name.clone(),
            reason: err.to_string(),
        }));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    loop {
        match stop_rx.recv_timeout(Duration::from_millis(STOP_POLL_MS)) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
    // Dropping the stream stops the device and waits out any in-flight
    // callback; joining this worker is therefore the no-more-frames
    // guarantee `stop` relies on.
    drop(stream);
}

fn build_capture_stream(plan: &CapturePlan, sink: FrameSink) -> Result<cpal::Stream, CaptureError> {
    let channels = usize::from(plan.config.channels).max(1);
    let built = match plan.sample_format {
        SampleFormat::F32 => build_stream::<f32>(&plan.device, &plan.config, channels, sink),
        SampleFormat::I16 => build_stream::<i16>(&plan.device, &plan.config, channels, sink),
        SampleFormat::U16 => build_stream::<u16>(&plan.device, &plan.config, channels, sink),
        other => {
            return Err(CaptureError::Unsupported {
                device: plan.device_name.clone(),
                reason: format!("sample format {other:?}"),
            })
        }
    };
    built.map_err(|err| CaptureError::Open {
        device: plan.device_name.clone(),
        reason: err.to_string(),
    })
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    channels: usize,
    mut sink: FrameSink,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: cpal::FromSample<T>,
{
    let mut frame = Vec::<i16>::new();
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            frame.clear();
            if channels <= 1 {
                frame.extend(
                    data.iter()
                        .map(|sample| sample.to_sample::<f32>().to_sample::<i16>()),
                );
            } else {
                // Downmix interleaved channels by averaging each frame.
                frame.extend(data.chunks(channels).map(|chunk| {
                    let sum: f32 = chunk.iter().map(|sample| sample.to_sample::<f32>()).sum();
                    (sum / chunk.len() as f32).to_sample::<i16>()
                }));
            }
            if !frame.is_empty() {
                sink(&frame);
            }
        },
        |err| warn!(%err, "capture stream error"),
        None,
    )
}

fn join_worker_with_timeout(handle: JoinHandle<()>) {
    let deadline = Instant::now() + Duration::from_millis(WORKER_JOIN_TIMEOUT_MS);
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(WORKER_JOIN_POLL_MS));
    }
    if handle.is_finished() {
        if let Err(err) = handle.join() {
            warn!(?err, "capture worker panicked during shutdown");
        }
    } else {
        warn!("capture worker did not exit in time; detaching");
    }
}
