//! Vector store backends and per-session conversation memory.

pub mod conversation;
pub mod error;
pub mod in_memory_store;
pub mod normalize;
#[cfg(feature = "qdrant")]
pub mod qdrant_ops;
pub mod vector_store;

pub use conversation::{
    ConversationEntry, ConversationMemory, MemoryConfig, NO_PRIOR_CONVERSATION, SaveOutcome,
};
pub use error::MemoryError;
pub use in_memory_store::{InMemoryVectorStore, cosine_similarity};
pub use normalize::{normalize_question, question_hash};
#[cfg(feature = "qdrant")]
pub use qdrant_ops::QdrantOps;
pub use vector_store::{
    ScoredVectorPoint, StoredPoint, VectorPoint, VectorStore, VectorStoreError,
};
