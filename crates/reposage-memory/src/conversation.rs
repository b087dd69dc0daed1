//! Per-session question/answer memory with near-duplicate suppression.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reposage_llm::LlmProvider;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::normalize::normalize_question;
use crate::vector_store::{VectorPoint, VectorStore, VectorStoreError};

/// Returned by [`ConversationMemory::retrieve`] when nothing relevant is stored.
pub const NO_PRIOR_CONVERSATION: &str = "no prior conversation";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Similarity above which two questions are the same question.
    pub dedup_threshold: f32,
    /// Similarity an entry must exceed to be recalled.
    pub recall_threshold: f32,
    pub recall_top_k: usize,
    /// Neighbours inspected per dedup round on save.
    pub dedup_candidates: usize,
    pub collection_prefix: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            dedup_threshold: 0.93,
            recall_threshold: 0.4,
            recall_top_k: 3,
            dedup_candidates: 5,
            collection_prefix: "chat_memory_".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub question_hash: String,
    pub normalized_question: String,
    pub original_question: String,
    pub answer: String,
    /// Empty when the entry was read back from the store.
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub timestamp: DateTime<Utc>,
}

impl ConversationEntry {
    fn document(&self) -> String {
        format!("Q: {}\nA: {}", self.original_question, self.answer)
    }

    fn to_payload(&self) -> HashMap<String, serde_json::Value> {
        HashMap::from([
            ("question_hash".into(), self.question_hash.clone().into()),
            (
                "normalized_question".into(),
                self.normalized_question.clone().into(),
            ),
            (
                "original_question".into(),
                self.original_question.clone().into(),
            ),
            ("answer".into(), self.answer.clone().into()),
            ("document".into(), self.document().into()),
            ("timestamp".into(), self.timestamp.to_rfc3339().into()),
        ])
    }

    fn from_payload(payload: &HashMap<String, serde_json::Value>) -> Option<Self> {
        let text = |key: &str| payload.get(key).and_then(|v| v.as_str()).map(str::to_owned);
        Some(Self {
            question_hash: text("question_hash")?,
            normalized_question: text("normalized_question").unwrap_or_default(),
            original_question: text("original_question").unwrap_or_default(),
            answer: text("answer").unwrap_or_default(),
            embedding: Vec::new(),
            timestamp: text("timestamp")
                .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
                .map_or_else(Utc::now, |t| t.with_timezone(&Utc)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Same normalized question already stored; nothing written.
    Duplicate,
    /// Nothing left after normalization.
    Empty,
    /// New entry written after deleting `replaced` near-duplicates.
    Inserted { replaced: usize },
}

pub struct ConversationMemory<P> {
    store: Arc<dyn VectorStore>,
    provider: Arc<P>,
    config: MemoryConfig,
}

impl<P> std::fmt::Debug for ConversationMemory<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationMemory")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider> ConversationMemory<P> {
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>, provider: Arc<P>, config: MemoryConfig) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    #[must_use]
    pub fn collection_name(&self, session_id: &str) -> String {
        format!("{}{session_id}", self.config.collection_prefix)
    }

    /// Store a question/answer pair for `session_id`.
    ///
    /// An identical normalized question is skipped. Otherwise every stored
    /// entry whose similarity to the new question exceeds the dedup threshold is
    /// deleted before the new entry is inserted.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding the question or any store call fails.
    pub async fn save(&self, session_id: &str, question: &str, answer: &str) -> Result<SaveOutcome> {
        let normalized = normalize_question(question);
        if normalized.is_empty() {
            return Ok(SaveOutcome::Empty);
        }
        let hash = blake3::hash(normalized.as_bytes()).to_hex().to_string();
        let collection = self.collection_name(session_id);

        if self.store.collection_exists(&collection).await?
            && !self
                .store
                .existing_ids(&collection, vec![hash.clone()])
                .await?
                .is_empty()
        {
            tracing::debug!(session_id, "exact duplicate question, skipping save");
            return Ok(SaveOutcome::Duplicate);
        }

        let embedding = self.provider.embed(&normalized).await?;
        self.store
            .ensure_collection(&collection, embedding.len() as u64)
            .await?;

        let replaced = self.evict_near_duplicates(&collection, &embedding).await?;

        let entry = ConversationEntry {
            question_hash: hash.clone(),
            normalized_question: normalized,
            original_question: question.trim().to_owned(),
            answer: answer.to_owned(),
            embedding,
            timestamp: Utc::now(),
        };
        let payload = entry.to_payload();
        self.store
            .upsert(
                &collection,
                vec![VectorPoint {
                    id: hash,
                    vector: entry.embedding,
                    payload,
                }],
            )
            .await?;

        tracing::info!(session_id, replaced, "conversation entry saved");
        Ok(SaveOutcome::Inserted { replaced })
    }

    async fn evict_near_duplicates(
        &self,
        collection: &str,
        embedding: &[f32],
    ) -> std::result::Result<usize, VectorStoreError> {
        let limit = self.config.dedup_candidates.max(1);
        let mut replaced = 0;
        loop {
            let neighbours = self
                .store
                .search(collection, embedding.to_vec(), limit as u64)
                .await?;
            let near: Vec<String> = neighbours
                .iter()
                .filter(|n| n.score > self.config.dedup_threshold)
                .map(|n| n.id.clone())
                .collect();
            if near.is_empty() {
                return Ok(replaced);
            }
            let saturated = near.len() == limit;
            replaced += near.len();
            for id in &near {
                tracing::debug!(id = %id, "replacing near-duplicate question");
            }
            self.store.delete_by_ids(collection, near).await?;
            if !saturated {
                return Ok(replaced);
            }
        }
    }

    /// Prior exchanges relevant to `question`, or [`NO_PRIOR_CONVERSATION`].
    ///
    /// # Errors
    ///
    /// Returns an error if embedding the question or the store search fails.
    pub async fn retrieve(&self, session_id: &str, question: &str, top_k: usize) -> Result<String> {
        let collection = self.collection_name(session_id);
        if !self.store.collection_exists(&collection).await? {
            return Ok(NO_PRIOR_CONVERSATION.to_owned());
        }
        let normalized = normalize_question(question);
        if normalized.is_empty() || top_k == 0 {
            return Ok(NO_PRIOR_CONVERSATION.to_owned());
        }

        let embedding = self.provider.embed(&normalized).await?;
        let hits = self
            .store
            .search(&collection, embedding, top_k as u64)
            .await?;

        let mut out = String::new();
        let mut n = 0;
        for hit in hits
            .iter()
            .filter(|h| h.score > self.config.recall_threshold)
        {
            let Some(entry) = ConversationEntry::from_payload(&hit.payload) else {
                continue;
            };
            n += 1;
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            let _ = write!(
                out,
                "[related #{n} (similarity: {:.2})]\n{}",
                hit.score,
                entry.document()
            );
        }

        tracing::debug!(session_id, recalled = n, "conversation recall");
        if n == 0 {
            Ok(NO_PRIOR_CONVERSATION.to_owned())
        } else {
            Ok(out)
        }
    }

    /// Stored entries for `session_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store scroll fails.
    pub async fn entries(&self, session_id: &str) -> Result<Vec<ConversationEntry>> {
        let collection = self.collection_name(session_id);
        if !self.store.collection_exists(&collection).await? {
            return Ok(Vec::new());
        }
        let mut entries: Vec<_> = self
            .store
            .scroll(&collection)
            .await?
            .iter()
            .filter_map(|p| ConversationEntry::from_payload(&p.payload))
            .collect();
        entries.sort_by_key(|e| e.timestamp);
        Ok(entries)
    }

    /// Drop all memory for `session_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot delete the collection.
    pub async fn reset(&self, session_id: &str) -> Result<()> {
        self.store
            .delete_collection(&self.collection_name(session_id))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use reposage_llm::mock::MockProvider;

    use super::*;
    use crate::in_memory_store::InMemoryVectorStore;

    fn memory_with(mock: MockProvider, config: MemoryConfig) -> ConversationMemory<MockProvider> {
        ConversationMemory::new(Arc::new(InMemoryVectorStore::new()), Arc::new(mock), config)
    }

    #[tokio::test]
    async fn retrieve_without_collection_returns_sentinel() {
        let memory = memory_with(MockProvider::default(), MemoryConfig::default());
        let out = memory.retrieve("s1", "anything", 3).await.unwrap();
        assert_eq!(out, NO_PRIOR_CONVERSATION);
    }

    #[tokio::test]
    async fn saving_same_pair_twice_stores_one_entry() {
        let mock = MockProvider::bag_of_words(64);
        let memory = memory_with(mock.clone(), MemoryConfig::default());

        let first = memory.save("s1", "How does login work?", "It checks the hash.").await.unwrap();
        let second = memory.save("s1", "how does  LOGIN work", "It checks the hash.").await.unwrap();

        assert_eq!(first, SaveOutcome::Inserted { replaced: 0 });
        assert_eq!(second, SaveOutcome::Duplicate);
        assert_eq!(memory.entries("s1").await.unwrap().len(), 1);
        assert_eq!(mock.embed_calls(), 1);
    }

    #[tokio::test]
    async fn near_duplicate_replaces_older_entry() {
        let mock = MockProvider::default();
        mock.set_vector("where is main", vec![1.0, 0.0, 0.0]);
        mock.set_vector("where is the main", vec![0.99, 0.05, 0.0]);
        let memory = memory_with(mock, MemoryConfig::default());

        memory.save("s1", "Where is main?", "main.py").await.unwrap();
        let outcome = memory.save("s1", "Where is the main?", "src/main.py").await.unwrap();

        assert_eq!(outcome, SaveOutcome::Inserted { replaced: 1 });
        let entries = memory.entries("s1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].answer, "src/main.py");
    }

    #[tokio::test]
    async fn distinct_questions_both_survive() {
        let mock = MockProvider::default();
        mock.set_vector("where is main", vec![1.0, 0.0]);
        mock.set_vector("how does login work", vec![0.0, 1.0]);
        let memory = memory_with(mock, MemoryConfig::default());

        memory.save("s1", "Where is main?", "a").await.unwrap();
        memory.save("s1", "How does login work?", "b").await.unwrap();

        assert_eq!(memory.entries("s1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn retrieve_filters_below_recall_threshold() {
        let mock = MockProvider::default();
        mock.set_vector("login", vec![1.0, 0.0]);
        mock.set_vector("entry point", vec![0.0, 1.0]);
        mock.set_vector("login question", vec![0.9, 0.1]);
        let memory = memory_with(mock, MemoryConfig::default());

        memory.save("s1", "login", "uses bcrypt").await.unwrap();
        memory.save("s1", "entry point", "main.py").await.unwrap();

        let out = memory.retrieve("s1", "Login question?", 3).await.unwrap();
        assert!(out.starts_with("[related #1 (similarity: 0.99)]"));
        assert!(out.contains("A: uses bcrypt"));
        assert!(!out.contains("main.py"));
    }

    #[tokio::test]
    async fn entry_exactly_at_recall_threshold_is_not_recalled() {
        let mock = MockProvider::default();
        mock.set_vector("login", vec![1.0, 0.0]);
        mock.set_vector("deploy", vec![0.0, 1.0]);
        let config = MemoryConfig {
            recall_threshold: 0.0,
            ..MemoryConfig::default()
        };
        let memory = memory_with(mock, config);
        memory.save("s1", "login", "uses bcrypt").await.unwrap();

        // cosine of the orthogonal pair is exactly 0.0
        assert_eq!(memory.retrieve("s1", "deploy", 3).await.unwrap(), NO_PRIOR_CONVERSATION);
        let out = memory.retrieve("s1", "login", 3).await.unwrap();
        assert!(out.starts_with("[related #1 (similarity: 1.00)]"));
    }

    #[tokio::test]
    async fn sessions_are_isolated_and_reset_clears() {
        let memory = memory_with(MockProvider::bag_of_words(32), MemoryConfig::default());
        memory.save("a", "what is foo", "foo").await.unwrap();

        assert_eq!(memory.retrieve("b", "what is foo", 3).await.unwrap(), NO_PRIOR_CONVERSATION);
        assert_ne!(memory.retrieve("a", "what is foo", 3).await.unwrap(), NO_PRIOR_CONVERSATION);

        memory.reset("a").await.unwrap();
        assert_eq!(memory.retrieve("a", "what is foo", 3).await.unwrap(), NO_PRIOR_CONVERSATION);
    }

    #[tokio::test]
    async fn near_duplicate_collapse_holds_across_thresholds() {
        for threshold in [0.91_f32, 0.93, 0.95] {
            let mock = MockProvider::default();
            // cos 0.96 between the first two; gamma stays below every threshold
            mock.set_vector("alpha", vec![1.0, 0.0]);
            mock.set_vector("alpha again", vec![0.96, 0.28]);
            mock.set_vector("gamma", vec![0.6, 0.8]);
            let config = MemoryConfig {
                dedup_threshold: threshold,
                ..MemoryConfig::default()
            };
            let memory = memory_with(mock, config);

            memory.save("s", "alpha", "1").await.unwrap();
            memory.save("s", "alpha again", "2").await.unwrap();
            memory.save("s", "gamma", "3").await.unwrap();

            let answers: Vec<_> = memory
                .entries("s")
                .await
                .unwrap()
                .into_iter()
                .map(|e| e.answer)
                .collect();
            assert_eq!(answers.len(), 2, "threshold {threshold}");
            assert!(answers.contains(&"2".to_owned()));
            assert!(answers.contains(&"3".to_owned()));
        }
    }

    #[tokio::test]
    async fn empty_question_is_not_stored() {
        let memory = memory_with(MockProvider::default(), MemoryConfig::default());
        assert_eq!(memory.save("s", " ?! ", "x").await.unwrap(), SaveOutcome::Empty);
        assert!(memory.entries("s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_propagates() {
        let memory = memory_with(MockProvider::default().failing_embeddings(), MemoryConfig::default());
        assert!(memory.save("s", "q", "a").await.is_err());
    }
}
