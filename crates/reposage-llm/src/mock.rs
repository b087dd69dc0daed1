//! Test-only mock provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::LlmError;
use crate::provider::{CompletionOptions, LlmProvider};

/// How the mock turns text into vectors when no explicit mapping matches.
#[derive(Debug, Clone)]
pub enum MockEmbedding {
    /// Every text gets the same vector.
    Fixed(Vec<f32>),
    /// Word-count vector over a vocabulary grown on first sight of each word.
    BagOfWords { dims: usize },
}

#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    vectors: Arc<Mutex<HashMap<String, Vec<f32>>>>,
    vocabulary: Arc<Mutex<HashMap<String, usize>>>,
    embed_calls: Arc<AtomicUsize>,
    complete_calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
    pub default_response: String,
    pub embedding: MockEmbedding,
    pub fail_embed: bool,
    pub fail_complete: bool,
    /// Embedding fails for any text containing one of these markers.
    pub fail_embed_markers: Vec<String>,
    /// Milliseconds to sleep inside each call.
    pub delay_ms: u64,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            vectors: Arc::new(Mutex::new(HashMap::new())),
            vocabulary: Arc::new(Mutex::new(HashMap::new())),
            embed_calls: Arc::new(AtomicUsize::new(0)),
            complete_calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
            default_response: "mock response".into(),
            embedding: MockEmbedding::Fixed(vec![1.0, 0.0, 0.0, 0.0]),
            fail_embed: false,
            fail_complete: false,
            fail_embed_markers: Vec::new(),
            delay_ms: 0,
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn bag_of_words(dims: usize) -> Self {
        Self {
            embedding: MockEmbedding::BagOfWords { dims: dims.max(1) },
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_default_response(mut self, response: impl Into<String>) -> Self {
        self.default_response = response.into();
        self
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    #[must_use]
    pub fn failing_embeddings(mut self) -> Self {
        self.fail_embed = true;
        self
    }

    #[must_use]
    pub fn failing_completions(mut self) -> Self {
        self.fail_complete = true;
        self
    }

    #[must_use]
    pub fn fail_embed_containing(mut self, marker: impl Into<String>) -> Self {
        self.fail_embed_markers.push(marker.into());
        self
    }

    /// Pin the vector returned for an exact input text.
    pub fn set_vector(&self, text: impl Into<String>, vector: Vec<f32>) {
        self.vectors
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(text.into(), vector);
    }

    pub fn push_response(&self, response: impl Into<String>) {
        self.responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(response.into());
    }

    #[must_use]
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed running at once.
    #[must_use]
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        InFlight(&self.in_flight)
    }

    fn bag_of_words_vector(&self, text: &str, dims: usize) -> Vec<f32> {
        let mut vocabulary = self
            .vocabulary
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut vector = vec![0.0; dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let next = vocabulary.len();
            let slot = *vocabulary.entry(word.to_lowercase()).or_insert(next);
            vector[slot % dims] += 1.0;
        }
        vector
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl LlmProvider for MockProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter().await;

        if self.fail_embed || self.fail_embed_markers.iter().any(|m| text.contains(m.as_str())) {
            return Err(LlmError::Other("mock embedding error".into()));
        }
        let pinned = self
            .vectors
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(text)
            .cloned();
        if let Some(vector) = pinned {
            return Ok(vector);
        }
        Ok(match &self.embedding {
            MockEmbedding::Fixed(v) => v.clone(),
            MockEmbedding::BagOfWords { dims } => self.bag_of_words_vector(text, *dims),
        })
    }

    async fn complete(&self, _prompt: &str, _options: CompletionOptions) -> Result<String, LlmError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter().await;

        if self.fail_complete {
            return Err(LlmError::Other("mock completion error".into()));
        }
        let mut responses = self
            .responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}
