//! Binds the pipeline lifecycle to user settings and routes final
//! transcripts into catalog matching.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::catalog::{match_catalog, CatalogEntry};
use crate::config::VoiceSettings;
use crate::pipeline::{EventSink, PipelineState, SpeechPipeline};
use crate::transcript::TranscriptEvent;

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Invoked with the matched entry, synchronously from the matching path.
/// The coordinator does not wait for or inspect the launch outcome.
pub type LaunchHook = Arc<dyn Fn(&CatalogEntry) + Send + Sync>;

/// Catalog shared with the hosting application, which may edit it while
/// matching is running.
pub type SharedCatalog = Arc<RwLock<Vec<CatalogEntry>>>;

/// Outcome of the last reconcile, for status display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceStatus {
    Disabled,
    Listening,
    Failed(String),
}

/// Orchestrates the speech pipeline against external configuration and the
/// application catalog.
pub struct VoiceCoordinator {
    pipeline: SpeechPipeline,
    events: Receiver<TranscriptEvent>,
    status: VoiceStatus,
}

impl VoiceCoordinator {
    #[must_use]
    pub fn new(catalog: SharedCatalog, on_match: LaunchHook) -> Self {
        let (event_tx, event_rx) = bounded(EVENT_CHANNEL_CAPACITY);
        let sink = event_sink(catalog, on_match, event_tx);
        Self {
            pipeline: SpeechPipeline::new(sink),
            events: event_rx,
            status: VoiceStatus::Disabled,
        }
    }

    /// Transcript events for observers (live captioning, debug panels).
    /// Partial events appear here and nowhere else; they never drive
    /// matching or launching.
    #[must_use = "the receiver is required to observe transcript events"]
    pub fn events(&self) -> Receiver<TranscriptEvent> {
        self.events.clone()
    }

    #[must_use]
    pub fn status(&self) -> &VoiceStatus {
        &self.status
    }

    #[must_use]
    pub fn pipeline_state(&self) -> PipelineState {
        self.pipeline.state()
    }

    /// Reconciles the pipeline against the current settings.
    ///
    /// Start failures are recorded as a non-fatal status and are not
    /// retried automatically — the next settings change calls back in here
    /// and retries naturally.
    pub fn reconcile(&mut self, settings: &VoiceSettings) {
        if !settings.enabled {
            self.pipeline.stop();
            if self.status != VoiceStatus::Disabled {
                info!("voice triggers disabled");
            }
            self.status = VoiceStatus::Disabled;
            return;
        }
        if matches!(
            self.pipeline.state(),
            PipelineState::Running | PipelineState::Starting
        ) {
            self.status = VoiceStatus::Listening;
            return;
        }
        match self.pipeline.start(&settings.recognition_config()) {
            Ok(()) => {
                info!("voice triggers listening");
                self.status = VoiceStatus::Listening;
            }
            Err(err) => {
                warn!(%err, "voice pipeline start failed");
                self.status = VoiceStatus::Failed(err.to_string());
            }
        }
    }

    /// Stops the pipeline unconditionally; used at application shutdown.
    pub fn shutdown(&mut self) {
        self.pipeline.stop();
        self.status = VoiceStatus::Disabled;
    }
}

/// Builds the pipeline event sink: final transcripts run the catalog scan,
/// every event is fanned out to observers on a best-effort basis.
fn event_sink(
    catalog: SharedCatalog,
    on_match: LaunchHook,
    event_tx: Sender<TranscriptEvent>,
) -> EventSink {
    Arc::new(move |event: TranscriptEvent| {
        if let TranscriptEvent::Final(text) = &event {
            dispatch_final(&catalog, &on_match, text);
        }
        match event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!("transcript event dropped: observer queue full");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    })
}

fn dispatch_final(catalog: &RwLock<Vec<CatalogEntry>>, on_match: &LaunchHook, transcript: &str) {
    // Snapshot under the read lock so concurrent catalog edits can never
    // tear the scan; order within the snapshot is the caller's order.
    let snapshot = catalog
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone();
    match match_catalog(&snapshot, transcript) {
        Some(entry) => {
            info!(entry = %entry.name, transcript, "trigger phrase matched");
            on_match(entry);
        }
        None => debug!(transcript, "no trigger phrase matched"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TriggerPhrase;
    use crate::engine::test_support;
    use std::path::PathBuf;
    use std::sync::Mutex;

    fn entry(name: &str, phrase: &str) -> CatalogEntry {
        CatalogEntry {
            name: name.to_string(),
            exe_path: None,
            phrases: vec![TriggerPhrase::new(phrase)],
            speech_enabled: true,
        }
    }

    fn recording_hook() -> (LaunchHook, Arc<Mutex<Vec<String>>>) {
        let launched = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&launched);
        let hook: LaunchHook = Arc::new(move |entry: &CatalogEntry| {
            seen.lock().expect("hook lock").push(entry.name.clone());
        });
        (hook, launched)
    }

    #[test]
    fn final_events_drive_matching_and_fan_out() {
        let catalog: SharedCatalog = Arc::new(RwLock::new(vec![entry("chess", "play chess")]));
        let (hook, launched) = recording_hook();
        let (event_tx, event_rx) = bounded(EVENT_CHANNEL_CAPACITY);
        let sink = event_sink(Arc::clone(&catalog), hook, event_tx);

        sink(TranscriptEvent::Final("please play chess now".to_string()));

        assert_eq!(launched.lock().expect("hook lock").as_slice(), ["chess"]);
        assert_eq!(
            event_rx.try_recv().expect("event should be observable"),
            TranscriptEvent::Final("please play chess now".to_string())
        );
    }

    #[test]
    fn partial_events_never_launch_but_remain_observable() {
        let catalog: SharedCatalog = Arc::new(RwLock::new(vec![entry("chess", "play chess")]));
        let (hook, launched) = recording_hook();
        let (event_tx, event_rx) = bounded(EVENT_CHANNEL_CAPACITY);
        let sink = event_sink(catalog, hook, event_tx);

        sink(TranscriptEvent::Partial("play chess".to_string()));

        assert!(launched.lock().expect("hook lock").is_empty());
        assert_eq!(
            event_rx.try_recv().expect("event should be observable"),
            TranscriptEvent::Partial("play chess".to_string())
        );
    }

    #[test]
    fn unmatched_finals_are_discarded_without_side_effects() {
        let catalog: SharedCatalog = Arc::new(RwLock::new(vec![entry("chess", "play chess")]));
        let (hook, launched) = recording_hook();
        let (event_tx, _event_rx) = bounded(EVENT_CHANNEL_CAPACITY);
        let sink = event_sink(catalog, hook, event_tx);

        sink(TranscriptEvent::Final("open the browser".to_string()));

        assert!(launched.lock().expect("hook lock").is_empty());
    }

    #[test]
    fn a_full_observer_queue_never_blocks_matching() {
        let catalog: SharedCatalog = Arc::new(RwLock::new(vec![entry("chess", "go")]));
        let (hook, launched) = recording_hook();
        let (event_tx, _event_rx) = bounded(1);
        let sink = event_sink(catalog, hook, event_tx);

        sink(TranscriptEvent::Final("go".to_string()));
        sink(TranscriptEvent::Final("go".to_string()));

        assert_eq!(launched.lock().expect("hook lock").len(), 2);
    }

    #[test]
    fn reconcile_disabled_stops_and_reports_disabled() {
        let catalog: SharedCatalog = Arc::new(RwLock::new(Vec::new()));
        let (hook, _launched) = recording_hook();
        let mut coordinator = VoiceCoordinator::new(catalog, hook);

        coordinator.reconcile(&VoiceSettings {
            enabled: false,
            microphone: None,
            model_path: PathBuf::from("/irrelevant"),
        });

        assert_eq!(coordinator.status(), &VoiceStatus::Disabled);
        assert_eq!(coordinator.pipeline_state(), PipelineState::Idle);
    }

    #[test]
    fn reconcile_records_start_failure_and_retries_on_next_call() {
        let _guard = test_support::probe_lock();
        let catalog: SharedCatalog = Arc::new(RwLock::new(Vec::new()));
        let (hook, _launched) = recording_hook();
        let mut coordinator = VoiceCoordinator::new(catalog, hook);
        let settings = VoiceSettings {
            enabled: true,
            microphone: None,
            model_path: PathBuf::from("/definitely/not/a/model/dir"),
        };

        coordinator.reconcile(&settings);
        assert!(matches!(coordinator.status(), VoiceStatus::Failed(_)));
        assert_eq!(coordinator.pipeline_state(), PipelineState::Failed);

        // The next reconcile retries the start rather than staying wedged.
        coordinator.reconcile(&settings);
        assert!(matches!(coordinator.status(), VoiceStatus::Failed(_)));

        coordinator.shutdown();
        assert_eq!(coordinator.pipeline_state(), PipelineState::Idle);
    }
}
