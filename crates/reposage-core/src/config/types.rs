use std::fmt;

use serde::{Deserialize, Serialize};

/// Wrapper for sensitive strings with redacted Debug/Display.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chunker: ChunkerConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub assembler: AssemblerConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

fn default_max_retries() -> u32 {
    3
}

fn default_tag_max_tokens() -> u32 {
    64
}

fn default_answer_max_tokens() -> u32 {
    2048
}

fn default_answer_temperature() -> f32 {
    0.2
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Chat model for answers and code edits.
    #[serde(default = "default_model")]
    pub model: String,
    /// Cheaper chat model for role and intent tags. Falls back to `model`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_model: Option<String>,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<Secret>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_tag_max_tokens")]
    pub tag_max_tokens: u32,
    #[serde(default = "default_answer_max_tokens")]
    pub answer_max_tokens: u32,
    #[serde(default = "default_answer_temperature")]
    pub answer_temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            tag_model: None,
            embedding_model: default_embedding_model(),
            api_key: None,
            max_retries: default_max_retries(),
            tag_max_tokens: default_tag_max_tokens(),
            answer_max_tokens: default_answer_max_tokens(),
            answer_temperature: default_answer_temperature(),
        }
    }
}

impl LlmConfig {
    #[must_use]
    pub fn tag_model(&self) -> &str {
        self.tag_model.as_deref().unwrap_or(&self.model)
    }
}

fn default_fallback_max_tokens() -> usize {
    256
}

fn default_fallback_overlap() -> usize {
    64
}

fn default_hard_cap() -> usize {
    512
}

fn default_base_tokens() -> usize {
    128
}

fn default_tokens_per_complexity() -> usize {
    32
}

fn default_base_overlap() -> usize {
    32
}

fn default_overlap_per_complexity() -> usize {
    8
}

fn default_overlap_cap() -> usize {
    128
}

/// Window sizes for the chunker. Definitions get
/// `base_tokens + complexity * tokens_per_complexity`, capped at `hard_cap`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkerConfig {
    #[serde(default = "default_fallback_max_tokens")]
    pub fallback_max_tokens: usize,
    #[serde(default = "default_fallback_overlap")]
    pub fallback_overlap: usize,
    #[serde(default = "default_hard_cap")]
    pub hard_cap: usize,
    #[serde(default = "default_base_tokens")]
    pub base_tokens: usize,
    #[serde(default = "default_tokens_per_complexity")]
    pub tokens_per_complexity: usize,
    #[serde(default = "default_base_overlap")]
    pub base_overlap: usize,
    #[serde(default = "default_overlap_per_complexity")]
    pub overlap_per_complexity: usize,
    #[serde(default = "default_overlap_cap")]
    pub overlap_cap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            fallback_max_tokens: default_fallback_max_tokens(),
            fallback_overlap: default_fallback_overlap(),
            hard_cap: default_hard_cap(),
            base_tokens: default_base_tokens(),
            tokens_per_complexity: default_tokens_per_complexity(),
            base_overlap: default_base_overlap(),
            overlap_per_complexity: default_overlap_per_complexity(),
            overlap_cap: default_overlap_cap(),
        }
    }
}

fn default_top_k() -> usize {
    20
}

fn default_concurrency() -> usize {
    20
}

fn default_repo_prefix() -> String {
    "repo_".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    /// Nearest chunks fetched per question before scoring.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Provider calls in flight during a build.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_repo_prefix")]
    pub collection_prefix: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            concurrency: default_concurrency(),
            collection_prefix: default_repo_prefix(),
        }
    }
}

fn default_context_window() -> usize {
    128_000
}

fn default_reserved_response_tokens() -> usize {
    2048
}

fn default_max_chunks() -> usize {
    10
}

fn default_fill_ratio() -> f64 {
    0.9
}

fn default_oversize_ratio() -> f64 {
    0.3
}

fn default_min_chunks() -> usize {
    3
}

fn default_backfill_chunks() -> usize {
    5
}

fn default_min_score() -> f32 {
    3.0
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssemblerConfig {
    #[serde(default = "default_context_window")]
    pub model_context_window: usize,
    #[serde(default = "default_reserved_response_tokens")]
    pub reserved_response_tokens: usize,
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
    #[serde(default = "default_fill_ratio")]
    pub fill_ratio: f64,
    #[serde(default = "default_oversize_ratio")]
    pub oversize_ratio: f64,
    #[serde(default = "default_min_chunks")]
    pub min_chunks: usize,
    #[serde(default = "default_backfill_chunks")]
    pub backfill_chunks: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f32,
    /// Backfill may admit one chunk past the budget, then stops.
    #[serde(default = "default_true")]
    pub backfill_allows_overrun: bool,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            model_context_window: default_context_window(),
            reserved_response_tokens: default_reserved_response_tokens(),
            max_chunks: default_max_chunks(),
            fill_ratio: default_fill_ratio(),
            oversize_ratio: default_oversize_ratio(),
            min_chunks: default_min_chunks(),
            backfill_chunks: default_backfill_chunks(),
            min_score: default_min_score(),
            backfill_allows_overrun: default_true(),
        }
    }
}

fn default_dedup_threshold() -> f32 {
    0.93
}

fn default_recall_threshold() -> f32 {
    0.4
}

fn default_recall_top_k() -> usize {
    3
}

fn default_dedup_candidates() -> usize {
    5
}

fn default_memory_prefix() -> String {
    "chat_memory_".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MemoryConfig {
    #[serde(default = "default_dedup_threshold")]
    pub dedup_threshold: f32,
    #[serde(default = "default_recall_threshold")]
    pub recall_threshold: f32,
    #[serde(default = "default_recall_top_k")]
    pub recall_top_k: usize,
    #[serde(default = "default_dedup_candidates")]
    pub dedup_candidates: usize,
    #[serde(default = "default_memory_prefix")]
    pub collection_prefix: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            dedup_threshold: default_dedup_threshold(),
            recall_threshold: default_recall_threshold(),
            recall_top_k: default_recall_top_k(),
            dedup_candidates: default_dedup_candidates(),
            collection_prefix: default_memory_prefix(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    #[default]
    Memory,
    Qdrant,
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub backend: VectorBackend,
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::default(),
            qdrant_url: default_qdrant_url(),
        }
    }
}

impl From<&ChunkerConfig> for reposage_index::ChunkerConfig {
    fn from(c: &ChunkerConfig) -> Self {
        Self {
            fallback_max_tokens: c.fallback_max_tokens,
            fallback_overlap: c.fallback_overlap,
            hard_cap: c.hard_cap,
            base_tokens: c.base_tokens,
            tokens_per_complexity: c.tokens_per_complexity,
            base_overlap: c.base_overlap,
            overlap_per_complexity: c.overlap_per_complexity,
            overlap_cap: c.overlap_cap,
        }
    }
}

impl From<&AssemblerConfig> for reposage_index::AssemblerConfig {
    fn from(c: &AssemblerConfig) -> Self {
        Self {
            model_context_window: c.model_context_window,
            reserved_response_tokens: c.reserved_response_tokens,
            max_chunks: c.max_chunks,
            fill_ratio: c.fill_ratio,
            oversize_ratio: c.oversize_ratio,
            min_chunks: c.min_chunks,
            backfill_chunks: c.backfill_chunks,
            min_score: c.min_score,
            backfill_allows_overrun: c.backfill_allows_overrun,
        }
    }
}

impl From<&MemoryConfig> for reposage_memory::MemoryConfig {
    fn from(c: &MemoryConfig) -> Self {
        Self {
            dedup_threshold: c.dedup_threshold,
            recall_threshold: c.recall_threshold,
            recall_top_k: c.recall_top_k,
            dedup_candidates: c.dedup_candidates,
            collection_prefix: c.collection_prefix.clone(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn indexer_config(&self) -> reposage_index::IndexerConfig {
        reposage_index::IndexerConfig {
            concurrency: self.index.concurrency.max(1),
            tag_max_tokens: self.llm.tag_max_tokens,
            chunker: (&self.chunker).into(),
        }
    }

    #[must_use]
    pub fn retrieval_config(&self) -> reposage_index::RetrievalConfig {
        reposage_index::RetrievalConfig {
            top_k: self.index.top_k,
            ..reposage_index::RetrievalConfig::default()
        }
    }

    #[must_use]
    pub fn assembler_config(&self) -> reposage_index::AssemblerConfig {
        (&self.assembler).into()
    }

    #[must_use]
    pub fn memory_config(&self) -> reposage_memory::MemoryConfig {
        (&self.memory).into()
    }
}
