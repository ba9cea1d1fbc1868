//! Small text helpers shared by discovery, extraction and deduplication.

/// Collapse every run of whitespace to a single space and trim the ends.
pub(crate) fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

/// First `max_chars` characters of `s`, never splitting a code point.
pub(crate) fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Normalized, non-empty text or `None`.
pub(crate) fn non_empty(s: &str) -> Option<String> {
    let cleaned = normalize_whitespace(s);
    (!cleaned.is_empty()).then_some(cleaned)
}
