//! Error types for reposage-index.

/// Errors that can occur while building or querying a repository index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Structural parse failed. Handled inside the chunker by falling back to windows.
    #[error("parse failed: {0}")]
    Parse(String),

    /// Every embedding in a build batch failed.
    #[error("build failed: all {failed} of {total} embeddings failed")]
    BuildFailed { failed: usize, total: usize },

    #[error("collection {0} not found, analyze the repository again")]
    CollectionNotFound(String),

    #[error("collection {0} is empty, analyze the repository again")]
    EmptyCollection(String),

    /// Chunk id already present in the batch or the collection.
    #[error("duplicate chunk id: {0}")]
    DuplicateId(String),

    #[error("vector store error: {0}")]
    VectorStore(#[from] reposage_memory::VectorStoreError),

    /// LLM provider error (embedding).
    #[error("LLM error: {0}")]
    Llm(#[from] reposage_llm::LlmError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
