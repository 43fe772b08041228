//! Application catalog entries and the first-match-wins trigger scan.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::matcher::{normalize, phrase_matches};

/// Trigger phrases attached to new entries when the user supplies none.
pub const DEFAULT_TRIGGER_PHRASES: &[&str] = &["запусти", "открой"];

/// One spoken phrase that triggers an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerPhrase {
    pub text: String,
}

impl TriggerPhrase {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A registered application as read by the voice core.
///
/// The core never mutates entries; phrase edits and persistence belong to
/// the hosting application. `exe_path` is consumed only by the launch hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(default)]
    pub exe_path: Option<PathBuf>,
    #[serde(default)]
    pub phrases: Vec<TriggerPhrase>,
    #[serde(default = "default_speech_enabled")]
    pub speech_enabled: bool,
}

fn default_speech_enabled() -> bool {
    true
}

impl CatalogEntry {
    /// New entry carrying the stock trigger phrases.
    #[must_use]
    pub fn with_default_phrases(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exe_path: None,
            phrases: DEFAULT_TRIGGER_PHRASES
                .iter()
                .map(|phrase| TriggerPhrase::new(*phrase))
                .collect(),
            speech_enabled: true,
        }
    }
}

/// Scans the catalog in caller-supplied order and returns the first entry
/// with a phrase occurring in the transcript.
///
/// Disabled entries and entries without phrases never participate. The scan
/// short-circuits at the first (entry, phrase) hit, so catalog order is the
/// only tie-break.
#[must_use = "the matched entry is what the launch hook receives"]
pub fn match_catalog<'a>(entries: &'a [CatalogEntry], transcript: &str) -> Option<&'a CatalogEntry> {
    let spoken = normalize(transcript);
    if spoken.is_empty() {
        return None;
    }
    entries.iter().find(|entry| {
        entry.speech_enabled
            && entry.phrases.iter().any(|phrase| {
                let trigger = normalize(&phrase.text);
                !trigger.is_empty() && phrase_matches(&spoken, &trigger)
            })
    })
}
