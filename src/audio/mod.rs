//! Microphone enumeration and the capture session feeding the pipeline.

mod capture;
mod devices;

pub use capture::{CaptureError, CapturePlan, CaptureSession, FrameSink, TARGET_SAMPLE_RATE_HZ};
pub use devices::{list_microphones, MicrophoneDevice};
