//! Per-session repository state kept between build and query calls.

use std::collections::HashMap;
use std::sync::RwLock;

use reposage_index::{BuildReport, SourceFile};

/// What a build leaves behind for later queries on the same session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub session_id: String,
    pub files: Vec<SourceFile>,
    /// Rendered tree of `files`, included in prompts.
    pub directory_structure: String,
    pub report: BuildReport,
    pub queries: u64,
}

impl SessionRecord {
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.report.chunk_count
    }

    /// First file whose name or path ends with `name`, compared case-insensitively.
    #[must_use]
    pub fn find_file(&self, name: &str) -> Option<&SourceFile> {
        let name = name.to_lowercase();
        self.files.iter().find(|f| {
            f.file_name.to_lowercase() == name || f.path.to_lowercase().ends_with(&name)
        })
    }
}

/// Session lifecycle: create on build, read and update on query, evict on reset.
pub trait SessionStore: Send + Sync {
    /// Store `record`, returning the record it replaced.
    fn create(&self, record: SessionRecord) -> Option<SessionRecord>;

    fn get(&self, session_id: &str) -> Option<SessionRecord>;

    /// Apply `f` to the stored record. Returns `false` when the session is unknown.
    fn update(&self, session_id: &str, f: &mut dyn FnMut(&mut SessionRecord)) -> bool;

    fn evict(&self, session_id: &str) -> Option<SessionRecord>;
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for InMemorySessionStore {
    fn create(&self, record: SessionRecord) -> Option<SessionRecord> {
        self.sessions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(record.session_id.clone(), record)
    }

    fn get(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }

    fn update(&self, session_id: &str, f: &mut dyn FnMut(&mut SessionRecord)) -> bool {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match sessions.get_mut(session_id) {
            Some(record) => {
                f(record);
                true
            }
            None => false,
        }
    }

    fn evict(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(session_id)
    }
}
