//! Sliding token windows.

use std::ops::Range;

/// Token index ranges covering `len` tokens with windows of at most
/// `max_tokens`, each starting `max_tokens - overlap` after the previous one.
///
/// `overlap` is clamped below `max_tokens` so the window always advances.
#[must_use]
pub(crate) fn token_windows(len: usize, max_tokens: usize, overlap: usize) -> Vec<Range<usize>> {
    let max_tokens = max_tokens.max(1);
    let step = max_tokens - overlap.min(max_tokens - 1);
    let mut windows = Vec::with_capacity(len / step + 1);
    let mut start = 0;
    while start < len {
        let end = (start + max_tokens).min(len);
        windows.push(start..end);
        if end == len {
            break;
        }
        start += step;
    }
    windows
}
