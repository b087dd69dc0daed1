//! Splitting source files into ordered, token-bounded chunks.
//!
//! One [`SourceChunker`] serves every file kind; the strategy comes from
//! [`Lang::strategy`]. Structural strategies share the definition policy in
//! [`ChunkSink::emit_definition`]: a definition that fits its complexity-scaled
//! budget becomes one chunk, anything larger becomes a header chunk followed by
//! windows over the body.

mod brace;
mod prose;
mod tree;
mod window;

use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use reposage_llm::Tokenizer;
use reposage_llm::tokenizer::slice_tokens;
use serde::{Deserialize, Serialize};

use crate::languages::{Lang, Strategy, detect_language};

pub(crate) use window::token_windows;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Class,
    Method,
    Function,
    #[default]
    Block,
}

impl ChunkType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Method => "method",
            Self::Function => "function",
            Self::Block => "block",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "class" => Some(Self::Class),
            "method" => Some(Self::Method),
            "function" => Some(Self::Function),
            "block" => Some(Self::Block),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fragment of a source file with its structural metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// `{file_path}_{chunk_index}`, unique within a repository.
    pub id: String,
    pub file_path: String,
    pub chunk_index: usize,
    pub text: String,
    pub token_count: usize,
    /// Token offsets of this chunk within the unit it was cut from.
    pub token_start: usize,
    pub token_end: usize,
    /// 1-based, inclusive.
    pub start_line: usize,
    pub end_line: usize,
    pub chunk_type: ChunkType,
    pub function_name: Option<String>,
    pub class_name: Option<String>,
    pub parent_entity: Option<String>,
    pub inheritance: Vec<String>,
    pub complexity: u32,
    /// Section title or block kind for document chunks.
    pub label: Option<String>,
    pub language: Lang,
    pub role_tag: Option<String>,
}

impl Chunk {
    /// Key under which an assembled context holds at most one chunk.
    #[must_use]
    pub fn identity(&self) -> (&str, Option<&str>, Option<&str>) {
        (
            &self.file_path,
            self.function_name.as_deref(),
            self.class_name.as_deref(),
        )
    }
}

/// Chunk size policy, all values in tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkerConfig {
    /// Window size for unstructured text and parse failures.
    pub fallback_max_tokens: usize,
    pub fallback_overlap: usize,
    /// Upper bound on any complexity-scaled budget.
    pub hard_cap: usize,
    pub base_tokens: usize,
    pub tokens_per_complexity: usize,
    pub base_overlap: usize,
    pub overlap_per_complexity: usize,
    pub overlap_cap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            fallback_max_tokens: 256,
            fallback_overlap: 64,
            hard_cap: 512,
            base_tokens: 128,
            tokens_per_complexity: 32,
            base_overlap: 32,
            overlap_per_complexity: 8,
            overlap_cap: 128,
        }
    }
}

impl ChunkerConfig {
    /// `(max_tokens, overlap)` for a definition of the given complexity.
    #[must_use]
    pub fn budget_for(&self, complexity: u32) -> (usize, usize) {
        let c = usize::try_from(complexity).unwrap_or(usize::MAX);
        let max_tokens = self
            .base_tokens
            .saturating_add(c.saturating_mul(self.tokens_per_complexity))
            .min(self.hard_cap);
        let overlap = self
            .base_overlap
            .saturating_add(c.saturating_mul(self.overlap_per_complexity))
            .min(self.overlap_cap);
        (max_tokens.max(1), overlap)
    }
}

/// Splits files into chunks with a per-language strategy.
#[derive(Clone)]
pub struct SourceChunker {
    tokenizer: Arc<dyn Tokenizer>,
    config: ChunkerConfig,
}

impl std::fmt::Debug for SourceChunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceChunker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SourceChunker {
    #[must_use]
    pub fn new(tokenizer: Arc<dyn Tokenizer>, config: ChunkerConfig) -> Self {
        Self { tokenizer, config }
    }

    #[must_use]
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunk one file. Deterministic for identical input; empty text yields no chunks.
    #[must_use]
    pub fn chunk(&self, file_path: &str, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let lang = detect_language(Path::new(file_path)).unwrap_or(Lang::Text);
        let mut sink = ChunkSink::new(file_path, text, lang, self.tokenizer.as_ref());

        match lang.strategy() {
            Strategy::Tree => {
                if let Err(e) = tree::chunk(&mut sink, &self.config) {
                    tracing::debug!(file = file_path, error = %e, "structural parse failed, using token windows");
                    sink.clear();
                }
            }
            Strategy::Brace => brace::chunk(&mut sink, &self.config),
            Strategy::Prose => prose::chunk(&mut sink, &self.config),
            Strategy::Window => {}
        }

        if sink.is_empty() {
            sink.push_windows(
                0..text.len(),
                self.config.fallback_max_tokens,
                self.config.fallback_overlap,
                &Entity::default(),
            );
        }
        sink.into_chunks()
    }
}

/// Byte offset to 1-based line number.
struct LineIndex {
    newlines: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        Self {
            newlines: text.match_indices('\n').map(|(i, _)| i).collect(),
        }
    }

    fn line_of(&self, byte: usize) -> usize {
        self.newlines.partition_point(|&nl| nl < byte) + 1
    }

    fn lines_of(&self, range: &Range<usize>) -> (usize, usize) {
        let start = self.line_of(range.start);
        let end = self.line_of(range.end.saturating_sub(1)).max(start);
        (start, end)
    }
}

/// Structural metadata shared by every chunk cut from one entity.
#[derive(Debug, Clone)]
pub(crate) struct Entity {
    pub chunk_type: ChunkType,
    pub function_name: Option<String>,
    pub class_name: Option<String>,
    pub parent_entity: Option<String>,
    pub inheritance: Vec<String>,
    pub complexity: u32,
    pub label: Option<String>,
}

impl Default for Entity {
    fn default() -> Self {
        Self {
            chunk_type: ChunkType::Block,
            function_name: None,
            class_name: None,
            parent_entity: None,
            inheritance: Vec::new(),
            complexity: 1,
            label: None,
        }
    }
}

impl Entity {
    pub(crate) fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }
}

/// A class or function located in the source, as byte ranges.
#[derive(Debug, Clone)]
pub(crate) struct Definition {
    /// Whole definition, including attached comments and attributes.
    pub range: Range<usize>,
    /// Declaration text placed in the header chunk.
    pub signature: Range<usize>,
    /// Docstring appended after the signature in the header chunk.
    pub docs: Option<String>,
    pub body: Range<usize>,
    pub entity: Entity,
}

/// Accumulates chunks for one file in emission order.
pub(crate) struct ChunkSink<'a> {
    pub source: &'a str,
    pub lang: Lang,
    file_path: &'a str,
    tokenizer: &'a dyn Tokenizer,
    lines: LineIndex,
    chunks: Vec<Chunk>,
}

impl<'a> ChunkSink<'a> {
    fn new(file_path: &'a str, source: &'a str, lang: Lang, tokenizer: &'a dyn Tokenizer) -> Self {
        Self {
            source,
            lang,
            file_path,
            tokenizer,
            lines: LineIndex::new(source),
            chunks: Vec::new(),
        }
    }

    pub(crate) fn file_path(&self) -> &str {
        self.file_path
    }

    fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    fn clear(&mut self) {
        self.chunks.clear();
    }

    fn into_chunks(self) -> Vec<Chunk> {
        let file_path = self.file_path;
        self.chunks
            .into_iter()
            .enumerate()
            .map(|(i, mut chunk)| {
                chunk.id = format!("{file_path}_{i}");
                chunk.chunk_index = i;
                chunk
            })
            .collect()
    }

    fn push(&mut self, text: &str, lines: (usize, usize), tokens: Range<usize>, entity: &Entity) {
        self.chunks.push(Chunk {
            id: String::new(),
            file_path: self.file_path.to_owned(),
            chunk_index: 0,
            text: text.to_owned(),
            token_count: self.tokenizer.count(text),
            token_start: tokens.start,
            token_end: tokens.end,
            start_line: lines.0,
            end_line: lines.1,
            chunk_type: entity.chunk_type,
            function_name: entity.function_name.clone(),
            class_name: entity.class_name.clone(),
            parent_entity: entity.parent_entity.clone(),
            inheritance: entity.inheritance.clone(),
            complexity: entity.complexity.max(1),
            label: entity.label.clone(),
            language: self.lang,
            role_tag: None,
        });
    }

    /// Push `source[range]` with surrounding whitespace trimmed. Blank slices are dropped.
    pub(crate) fn push_slice(&mut self, range: Range<usize>, tokens: Range<usize>, entity: &Entity) {
        let raw = &self.source[range.clone()];
        let text = raw.trim();
        if text.is_empty() {
            return;
        }
        let start = range.start + (raw.len() - raw.trim_start().len());
        let lines = self.lines.lines_of(&(start..start + text.len()));
        self.push(text, lines, tokens, entity);
    }

    /// Window `source[range]` on token boundaries. A region within `max_tokens` becomes one chunk.
    pub(crate) fn push_windows(
        &mut self,
        range: Range<usize>,
        max_tokens: usize,
        overlap: usize,
        entity: &Entity,
    ) {
        let spans = self.tokenizer.token_spans(&self.source[range.clone()]);
        for w in token_windows(spans.len(), max_tokens, overlap) {
            let lo = range.start + spans[w.start].start;
            let hi = range.start + spans[w.end - 1].end;
            self.push_slice(lo..hi, w, entity);
        }
    }

    /// Window text that does not appear verbatim in the source, reported at `lines`.
    fn push_text_windows(
        &mut self,
        text: &str,
        lines: (usize, usize),
        max_tokens: usize,
        overlap: usize,
        entity: &Entity,
    ) {
        let spans = self.tokenizer.token_spans(text);
        for w in token_windows(spans.len(), max_tokens, overlap) {
            let piece = slice_tokens(text, &spans, w.start, w.end).trim();
            if !piece.is_empty() {
                self.push(piece, lines, w, entity);
            }
        }
    }

    /// One chunk when the definition fits its budget, otherwise a header chunk
    /// (imports, signature, docstring) followed by windows over the body.
    ///
    /// Methods get no imports in their header.
    pub(crate) fn emit_definition(&mut self, def: &Definition, imports: &str, config: &ChunkerConfig) {
        let (max_tokens, overlap) = config.budget_for(def.entity.complexity);
        let whole = self.tokenizer.count(&self.source[def.range.clone()]);
        if whole <= max_tokens {
            self.push_slice(def.range.clone(), 0..whole, &def.entity);
            return;
        }

        let mut header = String::new();
        if def.entity.chunk_type != ChunkType::Method && !imports.is_empty() {
            header.push_str(imports.trim_end());
            header.push_str("\n\n");
        }
        header.push_str(self.source[def.signature.clone()].trim());
        if let Some(docs) = &def.docs {
            header.push('\n');
            header.push_str(docs);
        }
        let signature_lines = if def.signature.is_empty() {
            self.lines.lines_of(&def.range)
        } else {
            self.lines.lines_of(&def.signature)
        };
        self.push_text_windows(&header, signature_lines, max_tokens, overlap, &def.entity);
        self.push_windows(def.body.clone(), max_tokens, overlap, &def.entity);
    }
}
