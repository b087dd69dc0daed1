//! Error types for reposage-core.

use std::fmt;

use reposage_index::IndexError;
use reposage_llm::LlmError;
use reposage_memory::MemoryError;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] reposage_memory::VectorStoreError),

    #[error("session {0} not found, analyze the repository first")]
    SessionNotFound(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Machine-readable reason a query failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    SessionNotFound,
    CollectionNotFound,
    EmptyCollection,
    EmbeddingError,
    CompletionError,
    StoreError,
    BuildFailed,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionNotFound => "session_not_found",
            Self::CollectionNotFound => "collection_not_found",
            Self::EmptyCollection => "empty_collection",
            Self::EmbeddingError => "embedding_error",
            Self::CompletionError => "completion_error",
            Self::StoreError => "store_error",
            Self::BuildFailed => "build_failed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure of a single query, returned to the caller instead of propagating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct QueryError {
    pub code: ErrorCode,
    pub message: String,
}

impl QueryError {
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn session_not_found(session_id: &str) -> Self {
        Self::new(
            ErrorCode::SessionNotFound,
            CoreError::SessionNotFound(session_id.to_owned()).to_string(),
        )
    }

    /// Failure of the answer or edit completion itself.
    #[must_use]
    pub fn completion(err: &LlmError) -> Self {
        Self::new(ErrorCode::CompletionError, format!("completion failed: {err}"))
    }
}

impl From<IndexError> for QueryError {
    fn from(err: IndexError) -> Self {
        let code = match &err {
            IndexError::CollectionNotFound(_) => ErrorCode::CollectionNotFound,
            IndexError::EmptyCollection(_) => ErrorCode::EmptyCollection,
            IndexError::BuildFailed { .. } => ErrorCode::BuildFailed,
            IndexError::Llm(_) => ErrorCode::EmbeddingError,
            IndexError::Parse(_)
            | IndexError::DuplicateId(_)
            | IndexError::VectorStore(_)
            | IndexError::Json(_)
            | IndexError::Other(_) => ErrorCode::StoreError,
        };
        Self::new(code, err.to_string())
    }
}

impl From<MemoryError> for QueryError {
    fn from(err: MemoryError) -> Self {
        let code = match &err {
            MemoryError::Llm(_) => ErrorCode::EmbeddingError,
            MemoryError::VectorStore(_) | MemoryError::Json(_) | MemoryError::Other(_) => {
                ErrorCode::StoreError
            }
        };
        Self::new(code, err.to_string())
    }
}
