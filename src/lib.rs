//! Voice-trigger launcher core: microphone capture, runtime-bound speech
//! recognition, transcript matching, and the lifecycle tying them to user
//! settings.

pub mod audio;
pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod matcher;
pub mod pipeline;
mod telemetry;
pub mod transcript;

pub use catalog::{match_catalog, CatalogEntry, TriggerPhrase};
pub use config::{RecognitionConfig, VoiceSettings};
pub use coordinator::{LaunchHook, SharedCatalog, VoiceCoordinator, VoiceStatus};
pub use pipeline::{PipelineError, PipelineState, SpeechPipeline};
pub use telemetry::init_tracing;
pub use transcript::TranscriptEvent;
