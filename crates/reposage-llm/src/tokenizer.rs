//! Token counting and token-aligned slicing.
//!
//! Chunk windows and context budgets are measured in tokens. A tokenizer here
//! reports byte spans rather than ids, so callers can cut text on token
//! boundaries and always get valid UTF-8 back.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

/// Whitespace attaches to the following word or symbol; trailing whitespace stands alone.
static PIECE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*\w+|\s*[^\w\s]|\s+").unwrap());

pub trait Tokenizer: Send + Sync {
    /// Byte ranges of each token in `text`, in order, contiguous from `0` to `text.len()`.
    fn token_spans(&self, text: &str) -> Vec<Range<usize>>;

    fn count(&self, text: &str) -> usize {
        self.token_spans(text).len()
    }
}

/// Deterministic sub-word tokenizer.
///
/// Words are split into pieces of at most `max_piece_chars` characters and every
/// punctuation character is its own token, which keeps counts close to BPE
/// vocabularies for source code (roughly four characters per token).
#[derive(Debug, Clone, Copy)]
pub struct HeuristicTokenizer {
    max_piece_chars: usize,
}

impl Default for HeuristicTokenizer {
    fn default() -> Self {
        Self { max_piece_chars: 4 }
    }
}

impl HeuristicTokenizer {
    #[must_use]
    pub fn new(max_piece_chars: usize) -> Self {
        Self {
            max_piece_chars: max_piece_chars.max(1),
        }
    }
}

impl Tokenizer for HeuristicTokenizer {
    fn token_spans(&self, text: &str) -> Vec<Range<usize>> {
        let mut spans = Vec::with_capacity(text.len() / 3 + 1);
        for m in PIECE_RE.find_iter(text) {
            split_piece(&mut spans, text, m.range(), self.max_piece_chars);
        }
        spans
    }
}

fn split_piece(spans: &mut Vec<Range<usize>>, text: &str, range: Range<usize>, max: usize) {
    let piece = &text[range.clone()];
    let body = piece
        .find(|c: char| !c.is_whitespace())
        .unwrap_or(piece.len());

    let mut start = range.start;
    let mut taken = 0;
    for (offset, _) in piece[body..].char_indices() {
        if taken == max {
            let cut = range.start + body + offset;
            spans.push(start..cut);
            start = cut;
            taken = 0;
        }
        taken += 1;
    }
    spans.push(start..range.end);
}

/// Text covered by tokens `start..end` of `spans`.
///
/// Out-of-range indices are clamped; an empty range yields `""`.
#[must_use]
pub fn slice_tokens<'a>(text: &'a str, spans: &[Range<usize>], start: usize, end: usize) -> &'a str {
    let end = end.min(spans.len());
    if start >= end {
        return "";
    }
    &text[spans[start].start..spans[end - 1].end]
}
