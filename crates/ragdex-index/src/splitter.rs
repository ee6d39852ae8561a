//! Deterministic character-window splitting used whenever AST chunking does not apply.

use std::ops::Range;

/// Byte ranges of consecutive windows of at most `chunk_size` characters,
/// neighbours sharing `overlap` characters.
///
/// Windows advance by `chunk_size - overlap` (at least one character) and stop
/// as soon as a window reaches the end of `text`, so no trailing window is a
/// pure repeat of overlap.
#[must_use]
pub fn split_spans(text: &str, chunk_size: usize, overlap: usize) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    if text.is_empty() || chunk_size == 0 {
        return spans;
    }

    // char boundary byte offsets, with the text length as a sentinel
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = bounds.len() - 1;
    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut start = 0;

    while start < char_len {
        let end = (start + chunk_size).min(char_len);
        spans.push(bounds[start]..bounds[end]);
        if end == char_len {
            break;
        }
        start += step;
    }

    spans
}

/// Same windows as [`split_spans`], as string slices.
#[must_use]
pub fn split_chars(text: &str, chunk_size: usize, overlap: usize) -> Vec<&str> {
    split_spans(text, chunk_size, overlap)
        .into_iter()
        .map(|r| &text[r])
        .collect()
}
