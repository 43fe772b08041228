//! Transcript events and the tolerant engine-payload extractor.
//!
//! Engine payloads are JSON-shaped text but are never trusted to be valid
//! JSON. The extractor scans for one quoted key and reads one quoted value;
//! anything else in the payload is ignored, and any deviation from that
//! shape yields no value rather than an error. Do not replace this with a
//! strict parser — the engine emits payloads a strict parser would reject.

/// Recognized text emitted by the speech pipeline.
///
/// `Partial` events are in-progress hypotheses for observability only;
/// `Final` events are committed utterances and the only kind that drives
/// matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    Partial(String),
    Final(String),
}

impl TranscriptEvent {
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            TranscriptEvent::Partial(text) | TranscriptEvent::Final(text) => text,
        }
    }

    #[must_use]
    pub fn is_final(&self) -> bool {
        matches!(self, TranscriptEvent::Final(_))
    }
}

/// Key carrying committed text in a final engine payload.
pub(crate) const FINAL_TEXT_KEY: &str = "text";
/// Key carrying the running hypothesis in a partial engine payload.
pub(crate) const PARTIAL_TEXT_KEY: &str = "partial";

/// Extracts the string value associated with `key` from an engine payload.
///
/// Scans for the literal `"key":` token (key match is ASCII
/// case-insensitive), skips whitespace, expects a quoted string, and
/// unescapes backslash-escaped characters one level until the closing
/// quote. Missing key, unquoted value, or truncation all yield `None`.
#[must_use = "a missing value means the frame is silently dropped"]
pub fn extract_payload_value(payload: &str, key: &str) -> Option<String> {
    let needle = format!("\"{}\":", key.to_ascii_lowercase());
    // ASCII lowercasing is byte-for-byte, so offsets into the lowered copy
    // are valid in the original payload.
    let start = payload.to_ascii_lowercase().find(&needle)? + needle.len();

    let mut chars = payload[start..].chars();
    let mut ch = chars.next()?;
    while ch.is_whitespace() {
        ch = chars.next()?;
    }
    if ch != '"' {
        return None;
    }

    let mut value = String::new();
    loop {
        match chars.next()? {
            '\\' => value.push(chars.next()?),
            '"' => return Some(value),
            other => value.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_final_text_value() {
        let payload = r#"{ "text" : "launch the browser" }"#;
        assert_eq!(
            extract_payload_value(payload, "text"),
            Some("launch the browser".to_string())
        );
    }

    #[test]
    fn extracts_partial_value_ignoring_other_keys() {
        let payload = r#"{"result":[{"word":"open"}],"partial":"open the"}"#;
        assert_eq!(
            extract_payload_value(payload, "partial"),
            Some("open the".to_string())
        );
    }

    #[test]
    fn key_match_is_ascii_case_insensitive() {
        assert_eq!(
            extract_payload_value(r#"{"TEXT":"hello"}"#, "text"),
            Some("hello".to_string())
        );
    }

    #[test]
    fn unescapes_one_level_of_backslash_escapes() {
        let payload = r#"{"text":"say \"hi\" over\\there"}"#;
        assert_eq!(
            extract_payload_value(payload, "text"),
            Some(r#"say "hi" over\there"#.to_string())
        );
    }

    #[test]
    fn empty_value_is_extracted_as_empty_string() {
        assert_eq!(
            extract_payload_value(r#"{"text":""}"#, "text"),
            Some(String::new())
        );
    }

    #[test]
    fn missing_key_yields_none() {
        assert_eq!(extract_payload_value(r#"{"partial":"x"}"#, "text"), None);
        assert_eq!(extract_payload_value("", "text"), None);
    }

    #[test]
    fn unquoted_value_yields_none() {
        assert_eq!(extract_payload_value(r#"{"text": 42}"#, "text"), None);
        assert_eq!(extract_payload_value(r#"{"text": null}"#, "text"), None);
    }

    #[test]
    fn truncated_payload_yields_none() {
        assert_eq!(extract_payload_value(r#"{"text":"cut off"#, "text"), None);
        assert_eq!(extract_payload_value(r#"{"text":"trailing\"#, "text"), None);
        assert_eq!(extract_payload_value(r#"{"text":"#, "text"), None);
    }

    #[test]
    fn non_ascii_values_pass_through() {
        assert_eq!(
            extract_payload_value(r#"{"text":"запусти игру"}"#, "text"),
            Some("запусти игру".to_string())
        );
    }

    #[test]
    fn transcript_event_accessors() {
        let partial = TranscriptEvent::Partial("he".to_string());
        let fin = TranscriptEvent::Final("hello".to_string());
        assert!(!partial.is_final());
        assert!(fin.is_final());
        assert_eq!(partial.text(), "he");
        assert_eq!(fin.text(), "hello");
    }
}
