//! Embedding and completion providers plus the tokenizer used for budgeting.

pub mod error;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod openai;
pub mod provider;
pub(crate) mod retry;
pub mod tokenizer;

pub use error::LlmError;
pub use provider::{CompletionOptions, LlmProvider};
pub use tokenizer::{HeuristicTokenizer, Tokenizer};
