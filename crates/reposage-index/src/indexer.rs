//! Build orchestrator: chunk → (embed, role tag) under a bounded pool → store.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use reposage_llm::{CompletionOptions, LlmProvider, Tokenizer};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::chunker::{Chunk, ChunkerConfig, SourceChunker};
use crate::context::{chunk_display_header, contextualize_for_embedding};
use crate::error::{IndexError, Result};
use crate::metadata::chunk_metadata;
use crate::store::{EmbeddingIndex, EmbeddingRecord};

/// Prompt asking for a short description of what a chunk is for.
pub const ROLE_TAG_PROMPT: &str = "What role or purpose does the following code serve? \
Summarize it briefly in one short phrase.\n\n";

/// A file supplied by the repository fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path relative to the repository root, `/`-separated.
    pub path: String,
    pub content: String,
    pub file_name: String,
    /// Extension without the dot, empty when there is none.
    pub file_type: String,
    pub sha: Option<String>,
    pub source_url: Option<String>,
}

impl SourceFile {
    /// File with name and type derived from `path`.
    #[must_use]
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        let p = Path::new(&path);
        let file_name = p
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_type = p
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            content: content.into(),
            file_name,
            file_type,
            sha: None,
            source_url: None,
            path,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexerConfig {
    /// Maximum provider calls in flight during a build.
    pub concurrency: usize,
    pub tag_max_tokens: u32,
    pub chunker: ChunkerConfig,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            concurrency: 20,
            tag_max_tokens: 64,
            chunker: ChunkerConfig::default(),
        }
    }
}

/// Summary of a build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub chunk_count: usize,
    pub files_indexed: usize,
    /// Chunks stored with a zero vector because embedding failed.
    pub failed_embeddings: usize,
    pub failed_tags: usize,
    pub duration_ms: u64,
}

struct UnitResult {
    index: usize,
    vector: Option<Vec<f32>>,
    tag: Option<String>,
}

/// Builds a session's embedding index from repository files.
pub struct RepoIndexer<P> {
    provider: Arc<P>,
    index: Arc<EmbeddingIndex>,
    chunker: SourceChunker,
    config: IndexerConfig,
}

impl<P> std::fmt::Debug for RepoIndexer<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoIndexer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider + 'static> RepoIndexer<P> {
    #[must_use]
    pub fn new(
        provider: Arc<P>,
        index: Arc<EmbeddingIndex>,
        tokenizer: Arc<dyn Tokenizer>,
        config: IndexerConfig,
    ) -> Self {
        let chunker = SourceChunker::new(tokenizer, config.chunker.clone());
        Self {
            provider,
            index,
            chunker,
            config,
        }
    }

    /// Chunks of every file, each paired with the index of the file it came from.
    #[must_use]
    pub fn chunk_files(&self, files: &[SourceFile]) -> Vec<(usize, Chunk)> {
        files
            .iter()
            .enumerate()
            .flat_map(|(i, file)| {
                self.chunker
                    .chunk(&file.path, &file.content)
                    .into_iter()
                    .map(move |c| (i, c))
            })
            .collect()
    }

    /// Chunk, embed, tag and store `files` under `session_id`.
    ///
    /// Every chunk is one unit of work (embedding plus role tag). Units run
    /// with at most `concurrency` in flight and are all awaited before the
    /// collection is written in one serial batch. A failed embedding becomes a
    /// zero vector; a failed tag becomes an empty tag.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::BuildFailed`] if every embedding fails, or an
    /// error from the index write.
    pub async fn build(&self, session_id: &str, files: &[SourceFile]) -> Result<BuildReport> {
        let start = Instant::now();
        let chunks = self.chunk_files(files);
        let mut report = BuildReport {
            chunk_count: chunks.len(),
            files_indexed: count_files(&chunks),
            ..BuildReport::default()
        };
        tracing::info!(session_id, files = files.len(), chunks = chunks.len(), "build started");
        if chunks.is_empty() {
            tracing::warn!(session_id, "no chunks produced, nothing to index");
            return Ok(report);
        }

        let results = self.run_units(&chunks).await;

        let failed = results.iter().filter(|r| r.vector.is_none()).count();
        if failed == chunks.len() {
            tracing::error!(session_id, failed, "every embedding failed");
            return Err(IndexError::BuildFailed {
                failed,
                total: chunks.len(),
            });
        }
        let dims = results
            .iter()
            .find_map(|r| r.vector.as_ref().map(Vec::len))
            .unwrap_or_default();

        let mut records = Vec::with_capacity(chunks.len());
        for ((file_index, mut chunk), unit) in chunks.into_iter().zip(results) {
            let vector = unit.vector.unwrap_or_else(|| vec![0.0; dims]);
            match unit.tag {
                Some(tag) => chunk.role_tag = Some(tag).filter(|t| !t.is_empty()),
                None => report.failed_tags += 1,
            }
            records.push(EmbeddingRecord {
                metadata: chunk_metadata(&chunk, &files[file_index]),
                chunk_id: chunk.id,
                vector,
                text: chunk.text,
            });
        }
        report.failed_embeddings = failed;

        self.index.add(session_id, records).await?;

        report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        tracing::info!(
            session_id,
            chunks = report.chunk_count,
            failed = report.failed_embeddings,
            failed_tags = report.failed_tags,
            duration_ms = report.duration_ms,
            "build finished"
        );
        Ok(report)
    }

    /// Fan out one unit per chunk, then gather results back into chunk order.
    async fn run_units(&self, chunks: &[(usize, Chunk)]) -> Vec<UnitResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut join_set = JoinSet::new();

        for (index, (_, chunk)) in chunks.iter().enumerate() {
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&semaphore);
            let embed_text = contextualize_for_embedding(chunk);
            let tag_prompt = format!("{ROLE_TAG_PROMPT}{}", chunk.text);
            let header = chunk_display_header(chunk);
            let options = CompletionOptions::tag(self.config.tag_max_tokens);

            join_set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return UnitResult {
                        index,
                        vector: None,
                        tag: None,
                    };
                };
                let vector = match provider.embed(&embed_text).await {
                    Ok(v) => Some(v),
                    Err(e) => {
                        tracing::warn!(chunk = %header, error = %e, "embedding failed, storing zero vector");
                        None
                    }
                };
                let tag = match provider.complete(&tag_prompt, options).await {
                    Ok(t) => Some(t.trim().to_owned()),
                    Err(e) => {
                        tracing::warn!(chunk = %header, error = %e, "role tagging failed");
                        None
                    }
                };
                UnitResult { index, vector, tag }
            });
        }

        let mut slots: Vec<Option<UnitResult>> = std::iter::repeat_with(|| None)
            .take(chunks.len())
            .collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(unit) => {
                    let i = unit.index;
                    slots[i] = Some(unit);
                }
                Err(e) => tracing::warn!(error = %e, "build task aborted"),
            }
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or(UnitResult {
                    index,
                    vector: None,
                    tag: None,
                })
            })
            .collect()
    }
}

fn count_files(chunks: &[(usize, Chunk)]) -> usize {
    let mut files: Vec<usize> = chunks.iter().map(|(i, _)| *i).collect();
    files.dedup();
    files.len()
}

#[cfg(test)]
mod tests {
    use reposage_llm::HeuristicTokenizer;
    use reposage_llm::mock::MockProvider;
    use reposage_memory::InMemoryVectorStore;

    use super::*;

    fn indexer(mock: MockProvider, concurrency: usize) -> (RepoIndexer<MockProvider>, Arc<EmbeddingIndex>) {
        let index = Arc::new(EmbeddingIndex::new(Arc::new(InMemoryVectorStore::new()), "repo_"));
        let config = IndexerConfig {
            concurrency,
            ..IndexerConfig::default()
        };
        let indexer = RepoIndexer::new(
            Arc::new(mock),
            Arc::clone(&index),
            Arc::new(HeuristicTokenizer::default()),
            config,
        );
        (indexer, index)
    }

    fn files() -> Vec<SourceFile> {
        vec![
            SourceFile::new("notes.txt", "alpha beta gamma"),
            SourceFile::new("empty.txt", "   "),
            SourceFile::new("docs/guide.md", "# Guide\nRead me.\n\n# Usage\nRun it.\n"),
        ]
    }

    #[test]
    fn source_file_derives_name_and_type() {
        let file = SourceFile::new("src/app/main.py", "");
        assert_eq!(file.file_name, "main.py");
        assert_eq!(file.file_type, "py");
        assert_eq!(SourceFile::new("Makefile", "").file_type, "");
    }

    #[tokio::test]
    async fn build_stores_every_chunk_with_role_tags() {
        let mock = MockProvider::default().with_default_response("  entry point  ");
        let (indexer, index) = indexer(mock, 4);
        let report = indexer.build("s1", &files()).await.unwrap();

        assert_eq!(report.chunk_count, 3);
        assert_eq!(report.files_indexed, 2);
        assert_eq!(report.failed_embeddings, 0);
        assert_eq!(index.count("s1").await.unwrap(), 3);

        let hits = index.query("s1", vec![1.0, 0.0, 0.0, 0.0], 10).await.unwrap();
        assert!(hits.iter().all(|h| h.metadata["role_tag"] == "entry point"));
        assert!(hits.iter().any(|h| h.id == "docs/guide.md_1" && h.text == "# Usage\nRun it."));
    }

    #[tokio::test]
    async fn failed_embedding_gets_zero_vector() {
        let mock = MockProvider::default().fail_embed_containing("gamma");
        let (indexer, index) = indexer(mock, 4);
        let report = indexer.build("s1", &files()).await.unwrap();
        assert_eq!(report.failed_embeddings, 1);
        assert_eq!(index.count("s1").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn all_embeddings_failing_is_build_failed() {
        let (indexer, index) = indexer(MockProvider::default().failing_embeddings(), 4);
        let err = indexer.build("s1", &files()).await.unwrap_err();
        assert!(matches!(err, IndexError::BuildFailed { failed: 3, total: 3 }));
        assert!(!index.exists("s1").await.unwrap());
    }

    #[tokio::test]
    async fn failed_tags_are_counted_not_fatal() {
        let (indexer, index) = indexer(MockProvider::default().failing_completions(), 4);
        let report = indexer.build("s1", &files()).await.unwrap();
        assert_eq!(report.failed_tags, 3);
        let hits = index.query("s1", vec![1.0, 0.0, 0.0, 0.0], 10).await.unwrap();
        assert!(hits.iter().all(|h| h.metadata["role_tag"] == ""));
    }

    #[tokio::test]
    async fn provider_calls_respect_concurrency_limit() {
        let mock = MockProvider::default().with_delay(5);
        let counters = mock.clone();
        let many: Vec<SourceFile> = (0..12)
            .map(|i| SourceFile::new(format!("f{i}.txt"), format!("content {i}")))
            .collect();
        let (indexer, _) = indexer(mock, 3);
        let report = indexer.build("s1", &many).await.unwrap();
        assert_eq!(report.chunk_count, 12);
        assert!(counters.peak_concurrency() <= 3);
        assert_eq!(counters.embed_calls(), 12);
        assert_eq!(counters.complete_calls(), 12);
    }

    #[tokio::test]
    async fn rebuilding_same_session_is_duplicate_id() {
        let (indexer, _) = indexer(MockProvider::default(), 4);
        indexer.build("s1", &files()).await.unwrap();
        let err = indexer.build("s1", &files()).await.unwrap_err();
        assert!(matches!(err, IndexError::DuplicateId(_)));
    }

    #[tokio::test]
    async fn no_chunks_is_an_empty_report() {
        let (indexer, index) = indexer(MockProvider::default(), 4);
        let report = indexer.build("s1", &[SourceFile::new("a.txt", "")]).await.unwrap();
        assert_eq!(report, BuildReport { duration_ms: report.duration_ms, ..BuildReport::default() });
        assert!(!index.exists("s1").await.unwrap());
    }
}
