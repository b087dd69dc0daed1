//! Configuration, session records and the [`RepoAssistant`] facade.
//!
//! [`RepoAssistant`] exposes the repository operations callers use:
//! `build` a session from files, `answer_query` for a token-budgeted context,
//! `remember` and `recall` conversation history, and `reset` a session.

pub mod assistant;
pub mod config;
pub mod error;
pub mod prompt;
pub mod session;
pub mod store;

pub use assistant::{Answer, CodeEdit, QueryAnswer, RepoAssistant};
pub use config::Config;
pub use error::{CoreError, ErrorCode, QueryError, Result};
pub use session::{InMemorySessionStore, SessionRecord, SessionStore};
pub use store::open_vector_store;
