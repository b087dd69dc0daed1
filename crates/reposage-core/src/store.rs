//! Vector store selection from configuration.

use std::sync::Arc;

use reposage_memory::{InMemoryVectorStore, VectorStore};

use crate::config::{VectorBackend, VectorStoreConfig};
use crate::error::Result;

/// Open the backend named in `config`.
///
/// # Errors
///
/// Returns an error if Qdrant is requested but unavailable in this build or
/// its client cannot be created.
pub fn open_vector_store(config: &VectorStoreConfig) -> Result<Arc<dyn VectorStore>> {
    match config.backend {
        VectorBackend::Memory => {
            tracing::debug!("using in-memory vector store");
            Ok(Arc::new(InMemoryVectorStore::new()))
        }
        VectorBackend::Qdrant => open_qdrant(&config.qdrant_url),
    }
}

#[cfg(feature = "qdrant")]
fn open_qdrant(url: &str) -> Result<Arc<dyn VectorStore>> {
    let ops = reposage_memory::QdrantOps::new(url).map_err(|e| {
        reposage_memory::VectorStoreError::Connection(format!("qdrant at {url}: {e}"))
    })?;
    tracing::info!(url, "using qdrant vector store");
    Ok(Arc::new(ops))
}

#[cfg(not(feature = "qdrant"))]
fn open_qdrant(_url: &str) -> Result<Arc<dyn VectorStore>> {
    Err(crate::error::CoreError::Other(
        "qdrant backend requested but reposage was built without the qdrant feature".into(),
    ))
}
