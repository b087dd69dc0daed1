//! One vector collection per repository session.

use std::collections::HashSet;
use std::sync::Arc;

use reposage_memory::{VectorPoint, VectorStore};

use crate::error::{IndexError, Result};
use crate::metadata::{DOCUMENT_FIELD, Metadata};

/// A chunk vector with the text and metadata stored beside it.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: Metadata,
}

/// A query result. `distance` is `1 - cosine similarity`.
#[derive(Debug, Clone)]
pub struct QueryHit {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub distance: f32,
}

/// Per-session chunk collections on top of a [`VectorStore`].
pub struct EmbeddingIndex {
    store: Arc<dyn VectorStore>,
    collection_prefix: String,
}

impl std::fmt::Debug for EmbeddingIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingIndex")
            .field("collection_prefix", &self.collection_prefix)
            .finish_non_exhaustive()
    }
}

impl EmbeddingIndex {
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>, collection_prefix: impl Into<String>) -> Self {
        Self {
            store,
            collection_prefix: collection_prefix.into(),
        }
    }

    #[must_use]
    pub fn collection_name(&self, session_id: &str) -> String {
        format!("{}{session_id}", self.collection_prefix)
    }

    /// Insert a batch of records into the session collection, creating it if needed.
    ///
    /// Nothing is written when any id repeats within the batch or is already stored.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::DuplicateId`] for a repeated id, or a store error.
    pub async fn add(&self, session_id: &str, records: Vec<EmbeddingRecord>) -> Result<usize> {
        let Some(first) = records.first() else {
            return Ok(0);
        };
        let vector_size = first.vector.len() as u64;

        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            if !seen.insert(record.chunk_id.as_str()) {
                return Err(IndexError::DuplicateId(record.chunk_id.clone()));
            }
        }

        let collection = self.collection_name(session_id);
        if self.store.collection_exists(&collection).await? {
            let ids = records.iter().map(|r| r.chunk_id.clone()).collect();
            if let Some(id) = self.store.existing_ids(&collection, ids).await?.into_iter().next() {
                return Err(IndexError::DuplicateId(id));
            }
        }
        self.store.ensure_collection(&collection, vector_size).await?;

        let count = records.len();
        let points = records
            .into_iter()
            .map(|r| {
                let mut payload = r.metadata;
                payload.insert(DOCUMENT_FIELD.into(), r.text.into());
                VectorPoint {
                    id: r.chunk_id,
                    vector: r.vector,
                    payload,
                }
            })
            .collect();
        self.store.upsert(&collection, points).await?;

        tracing::debug!(session_id, count, "records added");
        Ok(count)
    }

    /// The `k` nearest records by ascending distance.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::CollectionNotFound`] if the session was never built,
    /// [`IndexError::EmptyCollection`] if it holds no records.
    pub async fn query(&self, session_id: &str, vector: Vec<f32>, k: usize) -> Result<Vec<QueryHit>> {
        let collection = self.collection_name(session_id);
        if !self.store.collection_exists(&collection).await? {
            return Err(IndexError::CollectionNotFound(collection));
        }
        if self.store.count(&collection).await? == 0 {
            return Err(IndexError::EmptyCollection(collection));
        }

        let hits = self
            .store
            .search(&collection, vector, k as u64)
            .await?;
        Ok(hits
            .into_iter()
            .map(|hit| {
                let mut metadata = hit.payload;
                let text = metadata
                    .remove(DOCUMENT_FIELD)
                    .and_then(|v| v.as_str().map(str::to_owned))
                    .unwrap_or_default();
                QueryHit {
                    id: hit.id,
                    text,
                    metadata,
                    distance: (1.0 - hit.score).max(0.0),
                }
            })
            .collect())
    }

    /// Number of records in the session collection.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::CollectionNotFound`] if the session was never built.
    pub async fn count(&self, session_id: &str) -> Result<u64> {
        let collection = self.collection_name(session_id);
        if !self.store.collection_exists(&collection).await? {
            return Err(IndexError::CollectionNotFound(collection));
        }
        Ok(self.store.count(&collection).await?)
    }

    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn exists(&self, session_id: &str) -> Result<bool> {
        Ok(self
            .store
            .collection_exists(&self.collection_name(session_id))
            .await?)
    }

    /// Drop the session collection. Missing collections are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot delete the collection.
    pub async fn delete(&self, session_id: &str) -> Result<()> {
        self.store
            .delete_collection(&self.collection_name(session_id))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use reposage_memory::InMemoryVectorStore;

    use super::*;

    fn index() -> EmbeddingIndex {
        EmbeddingIndex::new(Arc::new(InMemoryVectorStore::new()), "repo_")
    }

    fn record(id: &str, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            chunk_id: id.into(),
            vector,
            text: format!("text of {id}"),
            metadata: Metadata::from([("path".to_owned(), serde_json::Value::from("a.py"))]),
        }
    }

    #[tokio::test]
    async fn query_unknown_session_is_collection_not_found() {
        let err = index().query("never-built", vec![1.0, 0.0], 5).await.unwrap_err();
        assert!(matches!(err, IndexError::CollectionNotFound(ref name) if name == "repo_never-built"));
    }

    #[tokio::test]
    async fn empty_collection_is_distinct_from_missing() {
        let store = Arc::new(InMemoryVectorStore::new());
        store.ensure_collection("repo_s1", 2).await.unwrap();
        let index = EmbeddingIndex::new(store, "repo_");
        let err = index.query("s1", vec![1.0, 0.0], 5).await.unwrap_err();
        assert!(matches!(err, IndexError::EmptyCollection(_)));
        assert_eq!(index.count("s1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn query_orders_by_ascending_distance() {
        let index = index();
        index
            .add(
                "s1",
                vec![
                    record("far", vec![0.0, 1.0]),
                    record("near", vec![1.0, 0.1]),
                    record("mid", vec![1.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let hits = index.query("s1", vec![1.0, 0.0], 3).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid", "far"]);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
        assert_eq!(hits[0].text, "text of near");
        assert!(!hits[0].metadata.contains_key(DOCUMENT_FIELD));
        assert_eq!(hits[0].metadata["path"], "a.py");
    }

    #[tokio::test]
    async fn duplicate_ids_in_batch_write_nothing() {
        let index = index();
        let err = index
            .add(
                "s1",
                vec![record("a", vec![1.0, 0.0]), record("a", vec![0.0, 1.0])],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::DuplicateId(ref id) if id == "a"));
        assert!(!index.exists("s1").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_id_against_stored_record_fails() {
        let index = index();
        index.add("s1", vec![record("a", vec![1.0, 0.0])]).await.unwrap();
        let err = index
            .add(
                "s1",
                vec![record("b", vec![0.0, 1.0]), record("a", vec![1.0, 0.0])],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::DuplicateId(ref id) if id == "a"));
        assert_eq!(index.count("s1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_removes_collection() {
        let index = index();
        index.add("s1", vec![record("a", vec![1.0, 0.0])]).await.unwrap();
        assert!(index.exists("s1").await.unwrap());
        index.delete("s1").await.unwrap();
        assert!(!index.exists("s1").await.unwrap());
        index.delete("s1").await.unwrap();
    }
}
