use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Sampling parameters for a single completion call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionOptions {
    #[must_use]
    pub const fn new(max_tokens: u32, temperature: f32) -> Self {
        Self {
            max_tokens,
            temperature,
        }
    }

    /// Deterministic short completion, used for role and intent tags.
    #[must_use]
    pub const fn tag(max_tokens: u32) -> Self {
        Self::new(max_tokens, 0.0)
    }
}

/// Remote or local model that can embed text and complete prompts.
pub trait LlmProvider: Send + Sync {
    /// Embed `text` into a dense vector.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable or the response is malformed.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send;

    /// Complete a single-turn prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable or the response is empty.
    fn complete(
        &self,
        prompt: &str,
        options: CompletionOptions,
    ) -> impl Future<Output = Result<String, LlmError>> + Send;

    fn name(&self) -> &str;
}
