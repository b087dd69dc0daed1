//! Repository chunking, embedding index, relevance scoring and context assembly.
//!
//! Build phase: source files are split by [`chunker::SourceChunker`], embedded
//! through a bounded worker pool in [`indexer::RepoIndexer`] and written to an
//! [`store::EmbeddingIndex`] collection per session. Query phase:
//! [`retriever::CodeRetriever`] embeds the question, ranks the nearest chunks
//! with [`scorer`] and packs them into a token-budgeted context with
//! [`assembler::ContextAssembler`].

pub mod assembler;
pub mod chunker;
pub(crate) mod context;
pub mod error;
pub mod indexer;
pub mod languages;
pub mod metadata;
pub mod repo_map;
pub mod retriever;
pub mod scorer;
pub mod store;

pub use assembler::{AssembledContext, AssemblerConfig, ContextAssembler};
pub use chunker::{Chunk, ChunkType, ChunkerConfig, SourceChunker};
pub use error::{IndexError, Result};
pub use indexer::{BuildReport, IndexerConfig, RepoIndexer, SourceFile};
pub use retriever::{CodeRetriever, RetrievalConfig, Retrieved};
pub use scorer::{QuestionScope, RelevanceScorer, ScoredChunk, extract_scope};
pub use store::{EmbeddingIndex, EmbeddingRecord, QueryHit};
