//! Phrase normalization and trigger matching for spoken transcripts.
//!
//! Matching is deliberately exact: substring containment for multi-word
//! phrases, word-boundary containment for single words. Anything fuzzier
//! belongs to the recognition engine, not this layer.

/// Word characters are Unicode letters/digits plus underscore; everything
/// else is a separator during normalization and a boundary during matching.
#[inline]
fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// Normalizes arbitrary text into the only form the matcher accepts:
/// lowercase words separated by single spaces, no outer whitespace.
///
/// Idempotent by construction — the output contains only word characters
/// and single interior spaces, both of which pass through unchanged.
#[must_use = "only normalized text may be handed to phrase_matches"]
pub fn normalize(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    let mut pending_separator = false;
    for ch in text.chars() {
        if is_word_char(ch) {
            if pending_separator && !normalized.is_empty() {
                normalized.push(' ');
            }
            pending_separator = false;
            // Lowercasing can expand into combining marks (e.g. U+0130);
            // only word characters survive, keeping normalize idempotent.
            for lower in ch.to_lowercase() {
                if is_word_char(lower) {
                    normalized.push(lower);
                }
            }
        } else {
            pending_separator = true;
        }
    }
    normalized
}

/// Tests whether a normalized trigger phrase occurs in a normalized
/// transcript.
///
/// Multi-word phrases match as free substrings. Single-word phrases match
/// only at word boundaries, so the trigger "play" does not fire inside
/// "playlist". Both arguments must already be normalized.
#[must_use = "the match result decides whether a launch fires"]
pub fn phrase_matches(text: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    if phrase.contains(' ') {
        return text.contains(phrase);
    }
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find(phrase) {
        let start = search_from + offset;
        let end = start + phrase.len();
        let bounded_before = text[..start]
            .chars()
            .next_back()
            .map_or(true, |ch| !is_word_char(ch));
        let bounded_after = text[end..].chars().next().map_or(true, |ch| !is_word_char(ch));
        if bounded_before && bounded_after {
            return true;
        }
        search_from = start
            + text[start..]
                .chars()
                .next()
                .map_or(1, char::len_utf8);
    }
    false
}
