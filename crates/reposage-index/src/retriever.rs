//! Query phase: embed the question, rank the nearest chunks, pack a context.

use std::sync::Arc;

use reposage_llm::{CompletionOptions, LlmProvider};

use crate::assembler::{AssembledContext, ContextAssembler};
use crate::chunker::Chunk;
use crate::error::Result;
use crate::metadata::chunk_from_metadata;
use crate::scorer::{QuestionScope, RelevanceScorer, ScoredChunk};
use crate::store::EmbeddingIndex;

/// Prompt asking for the intent of a question, compared against chunk role tags.
pub const INTENT_TAG_PROMPT: &str = "In a few words, what role or purpose does the code this \
question asks about serve? Answer with a short phrase only.\n\nQuestion: ";

/// Retrieval configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalConfig {
    /// Nearest chunks fetched before scoring.
    pub top_k: usize,
    pub intent_max_tokens: u32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 20,
            intent_max_tokens: 32,
        }
    }
}

/// Result of a retrieval operation.
#[derive(Debug, Clone)]
pub struct Retrieved {
    pub context: AssembledContext,
    /// Every candidate, best first.
    pub ranked: Vec<ScoredChunk>,
    pub question_tag: String,
    pub scope: QuestionScope,
}

/// Ranks indexed chunks for a question and assembles them into a context.
pub struct CodeRetriever<P> {
    provider: Arc<P>,
    index: Arc<EmbeddingIndex>,
    assembler: ContextAssembler,
    config: RetrievalConfig,
}

impl<P> std::fmt::Debug for CodeRetriever<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeRetriever")
            .field("config", &self.config)
            .field("assembler", &self.assembler)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider> CodeRetriever<P> {
    #[must_use]
    pub fn new(
        provider: Arc<P>,
        index: Arc<EmbeddingIndex>,
        assembler: ContextAssembler,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            provider,
            index,
            assembler,
            config,
        }
    }

    #[must_use]
    pub fn assembler(&self) -> &ContextAssembler {
        &self.assembler
    }

    /// Short intent tag for `question`. Empty when the completion fails.
    pub async fn question_tag(&self, question: &str) -> String {
        let prompt = format!("{INTENT_TAG_PROMPT}{question}");
        match self
            .provider
            .complete(&prompt, CompletionOptions::tag(self.config.intent_max_tokens))
            .await
        {
            Ok(tag) => tag.trim().to_owned(),
            Err(e) => {
                tracing::warn!(error = %e, "intent tagging failed");
                String::new()
            }
        }
    }

    /// Nearest chunks to `question` with their distances, in retrieval order.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding fails or the session collection is missing or empty.
    pub async fn candidates(&self, session_id: &str, question: &str) -> Result<Vec<(Chunk, f32)>> {
        let vector = self.provider.embed(question).await?;
        let hits = self.index.query(session_id, vector, self.config.top_k).await?;
        Ok(hits
            .into_iter()
            .map(|hit| {
                let chunk = chunk_from_metadata(&hit.id, &hit.text, &hit.metadata);
                (chunk, hit.distance)
            })
            .collect())
    }

    /// Retrieve, score and assemble within the budget left after `question`.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding fails or the session collection is missing or empty.
    pub async fn retrieve(&self, session_id: &str, question: &str) -> Result<Retrieved> {
        let budget = self.assembler.max_context_tokens(question);
        self.retrieve_with_budget(session_id, question, budget).await
    }

    /// Like [`Self::retrieve`] with an explicit token budget.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding fails or the session collection is missing or empty.
    pub async fn retrieve_with_budget(
        &self,
        session_id: &str,
        question: &str,
        token_budget: usize,
    ) -> Result<Retrieved> {
        let candidates = self.candidates(session_id, question).await?;
        let question_tag = self.question_tag(question).await;

        let scorer = RelevanceScorer::new(question, &question_tag);
        let ranked = scorer.score_all(candidates);
        let context = self.assembler.assemble(&ranked, token_budget);

        tracing::debug!(
            session_id,
            candidates = ranked.len(),
            selected = context.chunk_ids.len(),
            question_tag = %question_tag,
            "retrieval finished"
        );
        Ok(Retrieved {
            context,
            ranked,
            question_tag,
            scope: scorer.scope().clone(),
        })
    }
}
