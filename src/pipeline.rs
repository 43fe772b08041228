//! Speech pipeline lifecycle: one recognizer, one capture session,
//! transcript events out.
//!
//! A single mutex serializes lifecycle transitions and guards the live
//! handles. The frame callback takes that mutex only long enough to clone
//! the recognizer handle, and `stop` releases it before joining capture and
//! before flushing — so a callback delivering its last frame can never
//! deadlock against a teardown in progress.

use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::audio::{CaptureError, CapturePlan, CaptureSession};
use crate::config::RecognitionConfig;
use crate::engine::{self, EngineCapability, EngineError, Recognizer};
use crate::transcript::{
    extract_payload_value, TranscriptEvent, FINAL_TEXT_KEY, PARTIAL_TEXT_KEY,
};

/// Where transcript events are delivered. Invoked inline on the capture
/// callback thread; implementations must not block for long.
pub type EventSink = Arc<dyn Fn(TranscriptEvent) + Send + Sync>;

/// Lifecycle of the one pipeline instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Starting,
    Running,
    Stopping,
    Failed,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

struct ControlBlock {
    state: PipelineState,
    failure: Option<String>,
    session: Option<CaptureSession>,
    recognizer: Option<Arc<Mutex<Recognizer>>>,
}

/// Owns the recognizer and capture session exclusively; no other component
/// ever holds a reference to either.
pub struct SpeechPipeline {
    control: Arc<Mutex<ControlBlock>>,
    sink: EventSink,
}

impl SpeechPipeline {
    #[must_use]
    pub fn new(sink: EventSink) -> Self {
        Self {
            control: Arc::new(Mutex::new(ControlBlock {
                state: PipelineState::Idle,
                failure: None,
                session: None,
                recognizer: None,
            })),
            sink,
        }
    }

    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.lock().state
    }

    /// Human-readable reason for the last start failure, if any.
    #[must_use]
    pub fn last_failure(&self) -> Option<String> {
        self.lock().failure.clone()
    }

    /// Brings the pipeline up. A no-op when already `Running` or
    /// `Starting`; a failed attempt leaves the pipeline in `Failed` with a
    /// recorded reason and is retryable by calling `start` again.
    pub fn start(&self, config: &RecognitionConfig) -> Result<(), PipelineError> {
        {
            let mut control = self.lock();
            match control.state {
                PipelineState::Running | PipelineState::Starting => {
                    debug!("start ignored: pipeline already active");
                    return Ok(());
                }
                PipelineState::Stopping => {
                    debug!("start ignored: pipeline is stopping");
                    return Ok(());
                }
                PipelineState::Idle | PipelineState::Failed => {}
            }
            control.state = PipelineState::Starting;
            control.failure = None;
        }
        match self.bring_up(config) {
            Ok(()) => Ok(()),
            Err(err) => {
                let mut control = self.lock();
                control.state = PipelineState::Failed;
                control.failure = Some(err.to_string());
                warn!(%err, "speech pipeline failed to start");
                Err(err)
            }
        }
    }

    /// Tears the pipeline down, flushing the recognizer for one trailing
    /// final event. Idempotent and infallible: flush or release problems
    /// are logged and swallowed so resource release always completes.
    pub fn stop(&self) {
        let (session, recognizer) = {
            let mut control = self.lock();
            match control.state {
                PipelineState::Idle | PipelineState::Stopping => return,
                PipelineState::Failed => {
                    control.state = PipelineState::Idle;
                    control.failure = None;
                    return;
                }
                PipelineState::Starting | PipelineState::Running => {}
            }
            control.state = PipelineState::Stopping;
            (control.session.take(), control.recognizer.take())
        };

        // Both the capture join and the flush happen with the lifecycle
        // lock released: a callback delivering its last frame needs that
        // lock briefly and must never find it held for the whole teardown.
        if let Some(mut session) = session {
            session.stop();
        }
        if let Some(recognizer) = recognizer {
            let payload = recognizer
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .flush();
            trace!(payload = %payload, "engine flush payload");
            if let Some(text) = extract_payload_value(&payload, FINAL_TEXT_KEY) {
                if !text.trim().is_empty() {
                    (self.sink)(TranscriptEvent::Final(text));
                }
            }
        }

        self.lock().state = PipelineState::Idle;
        debug!("speech pipeline stopped");
    }

    fn bring_up(&self, config: &RecognitionConfig) -> Result<(), PipelineError> {
        // Model directory is validated before anything else is touched, so
        // a bad path is reportable even when the engine is absent.
        if !config.model_path.is_dir() {
            return Err(EngineError::ModelPathInvalid(config.model_path.clone()).into());
        }
        let library = match engine::binding() {
            EngineCapability::Available(library) => library,
            EngineCapability::Unavailable { reason } => {
                debug!(%reason, "recognition engine unavailable");
                return Err(EngineError::NotPresent.into());
            }
        };

        // The plan resolves the device and the negotiated rate without
        // acquiring hardware; the recognizer needs the rate up front.
        let plan = CapturePlan::resolve(config.device_selector.as_deref())?;
        let sample_rate = plan.sample_rate();
        let device_name = plan.device_name().to_string();
        let recognizer = Arc::new(Mutex::new(
            library.create_recognizer(&config.model_path, sample_rate as f32)?,
        ));

        let control = Arc::clone(&self.control);
        let sink = Arc::clone(&self.sink);
        let session = plan.open(Box::new(move |frame| {
            deliver_frame(&control, &sink, frame);
        }))?;

        let mut control = self.lock();
        control.session = Some(session);
        control.recognizer = Some(recognizer);
        control.state = PipelineState::Running;
        debug!(device = %device_name, sample_rate, "speech pipeline running");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ControlBlock> {
        self.control
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[cfg(test)]
    pub(crate) fn set_state_for_tests(&self, state: PipelineState) {
        self.lock().state = state;
    }
}

/// Per-frame path, run on the capture callback thread. Every failure mode
/// here drops the frame and nothing else — a bad frame must never stop the
/// capture thread or move the pipeline out of `Running`.
fn deliver_frame(control: &Mutex<ControlBlock>, sink: &EventSink, frame: &[i16]) {
    let recognizer = {
        let control = control
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if control.state != PipelineState::Running {
            return;
        }
        match &control.recognizer {
            Some(recognizer) => Arc::clone(recognizer),
            None => return,
        }
    };

    let (finalized, payload) = {
        let mut recognizer = recognizer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let finalized = recognizer.accept_frame(frame);
        let payload = if finalized {
            recognizer.poll_result()
        } else {
            recognizer.poll_partial()
        };
        (finalized, payload)
    };
    trace!(payload = %payload, finalized, "engine payload");

    let key = if finalized {
        FINAL_TEXT_KEY
    } else {
        PARTIAL_TEXT_KEY
    };
    let Some(text) = extract_payload_value(&payload, key) else {
        return;
    };
    if text.trim().is_empty() {
        return;
    }
    let event = if finalized {
        TranscriptEvent::Final(text)
    } else {
        TranscriptEvent::Partial(text)
    };
    sink(event);
}
