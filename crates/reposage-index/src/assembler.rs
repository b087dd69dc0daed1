//! Token-budgeted context assembly from ranked chunks.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

use reposage_llm::Tokenizer;

use crate::chunker::Chunk;
use crate::scorer::ScoredChunk;

/// First line of every assembled context.
pub const CONTEXT_BANNER: &str =
    "Relevant repository code, one block per function, class or document section:";

const SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, PartialEq)]
pub struct AssemblerConfig {
    pub model_context_window: usize,
    pub reserved_response_tokens: usize,
    /// Primary pass stops after this many chunks.
    pub max_chunks: usize,
    /// Both passes stop once this share of the budget is used.
    pub fill_ratio: f64,
    /// Primary pass skips a chunk costing more than this share of the remaining budget.
    pub oversize_ratio: f64,
    /// Fewer primary selections than this trigger the backfill pass.
    pub min_chunks: usize,
    /// Backfill stops at this many chunks in total.
    pub backfill_chunks: usize,
    /// Primary pass ignores chunks scoring below this.
    pub min_score: f32,
    /// Backfill may admit one chunk that does not fit the remaining budget.
    pub backfill_allows_overrun: bool,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            model_context_window: 128_000,
            reserved_response_tokens: 2048,
            max_chunks: 10,
            fill_ratio: 0.9,
            oversize_ratio: 0.3,
            min_chunks: 3,
            backfill_chunks: 5,
            min_score: 3.0,
            backfill_allows_overrun: true,
        }
    }
}

/// Rendered context and what went into it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssembledContext {
    /// Empty when no chunk was selected.
    pub text: String,
    /// Selected chunk ids in inclusion order.
    pub chunk_ids: Vec<String>,
    /// Token count of `text`.
    pub used_tokens: usize,
    pub budget: usize,
    /// A backfill chunk pushed the context past `budget`.
    pub over_budget: bool,
}

impl AssembledContext {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunk_ids.is_empty()
    }
}

/// `[file: .. / function: .. / class: .. / lines: a~b / role: ..]` followed by the chunk text.
#[must_use]
pub fn render_chunk(chunk: &Chunk) -> String {
    let mut out = String::with_capacity(chunk.text.len() + 96);
    let _ = write!(out, "[file: {}", chunk.file_path);
    if let Some(f) = &chunk.function_name {
        let _ = write!(out, " / function: {f}");
    }
    if let Some(c) = &chunk.class_name {
        let _ = write!(out, " / class: {c}");
    }
    if let Some(label) = &chunk.label {
        let _ = write!(out, " / section: {label}");
    }
    let _ = write!(out, " / lines: {}~{}", chunk.start_line, chunk.end_line);
    if let Some(r) = chunk.role_tag.as_deref().filter(|r| !r.is_empty()) {
        let _ = write!(out, " / role: {r}");
    }
    out.push_str("]\n");
    out.push_str(&chunk.text);
    out
}

type Identity = (String, Option<String>, Option<String>);

fn identity_of(chunk: &Chunk) -> Identity {
    let (path, function, class) = chunk.identity();
    (path.to_owned(), function.map(str::to_owned), class.map(str::to_owned))
}

struct Selection {
    budget: usize,
    used: usize,
    separator_cost: usize,
    blocks: Vec<String>,
    ids: Vec<String>,
    identities: HashSet<Identity>,
    taken: HashSet<usize>,
    over_budget: bool,
}

impl Selection {
    fn remaining(&self) -> usize {
        self.budget.saturating_sub(self.used)
    }

    #[allow(clippy::cast_precision_loss)]
    fn filled(&self, ratio: f64) -> bool {
        self.used as f64 >= self.budget as f64 * ratio
    }

    fn take(&mut self, index: usize, chunk: &Chunk, block: String, cost: usize) {
        self.used += cost;
        self.identities.insert(identity_of(chunk));
        self.taken.insert(index);
        self.ids.push(chunk.id.clone());
        self.blocks.push(block);
    }
}

/// Selects and renders chunks under a token budget.
#[derive(Clone)]
pub struct ContextAssembler {
    tokenizer: Arc<dyn Tokenizer>,
    config: AssemblerConfig,
}

impl std::fmt::Debug for ContextAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextAssembler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ContextAssembler {
    #[must_use]
    pub fn new(tokenizer: Arc<dyn Tokenizer>, config: AssemblerConfig) -> Self {
        Self { tokenizer, config }
    }

    #[must_use]
    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Context window left after the question and the reserved response.
    #[must_use]
    pub fn max_context_tokens(&self, question: &str) -> usize {
        self.config
            .model_context_window
            .saturating_sub(self.tokenizer.count(question))
            .saturating_sub(self.config.reserved_response_tokens)
    }

    /// Select from `ranked` (best first) and render within `token_budget`.
    ///
    /// The primary pass skips repeated identities, low scores, chunks that do
    /// not fit and chunks larger than `oversize_ratio` of what remains. When it
    /// selects fewer than `min_chunks`, a backfill pass reconsiders the rest
    /// without the score floor or the oversize rule. With
    /// `backfill_allows_overrun`, backfill may admit one chunk that does not
    /// fit and then stops.
    #[must_use]
    pub fn assemble(&self, ranked: &[ScoredChunk], token_budget: usize) -> AssembledContext {
        let cfg = &self.config;
        let mut sel = Selection {
            budget: token_budget,
            used: self.tokenizer.count(CONTEXT_BANNER),
            separator_cost: self.tokenizer.count(SEPARATOR),
            blocks: Vec::new(),
            ids: Vec::new(),
            identities: HashSet::new(),
            taken: HashSet::new(),
            over_budget: false,
        };

        for (i, scored) in ranked.iter().enumerate() {
            if sel.ids.len() >= cfg.max_chunks || sel.filled(cfg.fill_ratio) {
                break;
            }
            let chunk = &scored.chunk;
            if sel.identities.contains(&identity_of(chunk)) || scored.score < cfg.min_score {
                continue;
            }
            let block = render_chunk(chunk);
            let cost = self.tokenizer.count(&block) + sel.separator_cost;
            let remaining = sel.remaining();
            #[allow(clippy::cast_precision_loss)]
            let oversized = cost as f64 > remaining as f64 * cfg.oversize_ratio;
            if cost > remaining || oversized {
                tracing::debug!(id = %chunk.id, cost, remaining, "chunk skipped for budget");
                continue;
            }
            sel.take(i, chunk, block, cost);
        }

        if sel.ids.len() < cfg.min_chunks {
            self.backfill(ranked, &mut sel);
        }

        if sel.ids.is_empty() {
            return AssembledContext {
                budget: token_budget,
                ..AssembledContext::default()
            };
        }

        let mut text = String::from(CONTEXT_BANNER);
        for block in &sel.blocks {
            text.push_str(SEPARATOR);
            text.push_str(block);
        }
        let used_tokens = self.tokenizer.count(&text);
        tracing::debug!(
            chunks = sel.ids.len(),
            used_tokens,
            budget = token_budget,
            over_budget = sel.over_budget,
            "context assembled"
        );
        AssembledContext {
            text,
            chunk_ids: sel.ids,
            used_tokens,
            budget: token_budget,
            over_budget: sel.over_budget,
        }
    }

    fn backfill(&self, ranked: &[ScoredChunk], sel: &mut Selection) {
        let cfg = &self.config;
        for (i, scored) in ranked.iter().enumerate() {
            if sel.ids.len() >= cfg.backfill_chunks || sel.filled(cfg.fill_ratio) {
                break;
            }
            let chunk = &scored.chunk;
            if sel.taken.contains(&i) || sel.identities.contains(&identity_of(chunk)) {
                continue;
            }
            let block = render_chunk(chunk);
            let cost = self.tokenizer.count(&block) + sel.separator_cost;
            if cost <= sel.remaining() {
                sel.take(i, chunk, block, cost);
            } else if cfg.backfill_allows_overrun {
                tracing::debug!(id = %chunk.id, cost, remaining = sel.remaining(), "backfill admits chunk over budget");
                sel.take(i, chunk, block, cost);
                sel.over_budget = true;
                break;
            }
        }
    }

    /// Assemble with the budget left after `question`.
    #[must_use]
    pub fn assemble_for(&self, question: &str, ranked: &[ScoredChunk]) -> AssembledContext {
        self.assemble(ranked, self.max_context_tokens(question))
    }
}
