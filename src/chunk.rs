//! Fixed-window text segmenter.
//!
//! Normalizes whitespace and slides a window of `chunk_size` characters
//! across the text with a stride of `chunk_size - overlap`. Windows are
//! measured in `char`s so multi-byte text is never split mid code point.
//!
//! Windows shorter than `min_chars` are dropped, except when the whole
//! normalized text fits into a single window.

/// Collapse every run of whitespace (including U+00A0) into one space and
/// trim both ends.
pub fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split(|c: char| c.is_whitespace() || c == '\u{a0}') {
        if word.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Split `text` into overlapping windows.
///
/// The stride is clamped to at least 1, so `overlap >= chunk_size` still
/// terminates.
pub fn segment(text: &str, chunk_size: usize, overlap: usize, min_chars: usize) -> Vec<String> {
    let normalized = normalize_whitespace(text);
    if normalized.is_empty() {
        return Vec::new();
    }

    let chunk_size = chunk_size.max(1);
    let chars: Vec<char> = normalized.chars().collect();
    if chars.len() <= chunk_size {
        return vec![normalized];
    }

    let stride = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        if end - start >= min_chars {
            chunks.push(chars[start..end].iter().collect());
        }
        start += stride;
    }
    chunks
}
