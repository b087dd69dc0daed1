//! Composite relevance of a retrieved chunk to a question.
//!
//! The score adds vector similarity, role-tag agreement, explicit mentions of
//! the chunk's file, class or function in the question, a weight per chunk
//! type and a small complexity bonus. Only the similarity term depends on the
//! distance, so the score never drops as a candidate gets closer.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::chunker::{Chunk, ChunkType};
use crate::languages::detect_language;

const SIMILARITY_WEIGHT: f32 = 10.0;
const ROLE_EXACT: f32 = 5.0;
const ROLE_CONTAINS: f32 = 3.0;
const ROLE_KEYWORD: f32 = 1.0;
const ROLE_CAP: f32 = 5.0;
const SCOPE_MATCH: f32 = 3.0;

static FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w\-/]*\w\.([A-Za-z0-9]{1,10})\b").unwrap());
static FILE_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\w+)\s*(?:파일|\bfile\b)").unwrap());
static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\w+)\s*(?:\(\s*\)|함수|메서드|메소드|\bfunction\b|\bmethod\b|\bfn\b)").unwrap()
});
static FUNCTION_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:def|fn|func)\s+(\w+)").unwrap());
static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\w+)\s*(?:클래스|\bclass\b|\bstruct\b|\binterface\b)").unwrap()
});
static DIRECTORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\w[\w.\-]*)\s*(?:디렉토리|디렉터리|폴더|\bdirectory\b|\bfolder\b|\bdir\b)")
        .unwrap()
});
static PATH_SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w[\w.\-]*)/").unwrap());

const EXTRA_EXTENSIONS: &[&str] = &[
    "json", "yaml", "yml", "toml", "html", "css", "scss", "sh", "sql", "xml", "ini", "cfg", "vue",
];

/// Words that precede a type suffix without naming anything.
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "this", "that", "which", "what", "each", "every", "any", "some", "my",
    "our", "your", "its", "whole", "entire", "full", "이", "그", "저", "어떤", "이런", "그런",
    "전체", "모든",
];

/// Names mentioned in a question, lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionScope {
    pub files: Vec<String>,
    pub functions: Vec<String>,
    pub classes: Vec<String>,
    pub directories: Vec<String>,
}

impl QuestionScope {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
            && self.functions.is_empty()
            && self.classes.is_empty()
            && self.directories.is_empty()
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    let value = value.to_lowercase();
    if value.is_empty() || STOPWORDS.contains(&value.as_str()) || list.contains(&value) {
        return;
    }
    list.push(value);
}

fn is_file_extension(ext: &str) -> bool {
    let ext = ext.to_ascii_lowercase();
    detect_language(Path::new(&format!("x.{ext}"))).is_some()
        || EXTRA_EXTENSIONS.contains(&ext.as_str())
}

/// File, function, class and directory hints: `name.ext` and `segment/`
/// tokens, and identifiers followed by a type word such as `함수` or `class`.
#[must_use]
pub fn extract_scope(question: &str) -> QuestionScope {
    let mut scope = QuestionScope::default();

    for caps in FILE_RE.captures_iter(question) {
        if is_file_extension(&caps[1]) {
            let full = &caps[0];
            let name = full.rsplit('/').next().unwrap_or(full);
            push_unique(&mut scope.files, name);
        }
    }
    for caps in FILE_SUFFIX_RE.captures_iter(question) {
        push_unique(&mut scope.files, &caps[1]);
    }
    for caps in FUNCTION_RE.captures_iter(question) {
        push_unique(&mut scope.functions, &caps[1]);
    }
    for caps in FUNCTION_PREFIX_RE.captures_iter(question) {
        push_unique(&mut scope.functions, &caps[1]);
    }
    for caps in CLASS_RE.captures_iter(question) {
        push_unique(&mut scope.classes, &caps[1]);
    }
    for caps in DIRECTORY_RE.captures_iter(question) {
        push_unique(&mut scope.directories, &caps[1]);
    }
    for caps in PATH_SEGMENT_RE.captures_iter(question) {
        push_unique(&mut scope.directories, &caps[1]);
    }
    scope
}

/// A candidate with its distance and composite score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// `1 - distance`, clamped to `[0, 1]`.
    pub similarity: f32,
    pub distance: f32,
    pub score: f32,
}

/// Scores candidates for one question.
#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    tag: String,
    tag_keywords: HashSet<String>,
    scope: QuestionScope,
}

fn keywords(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 2)
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

fn name_matches(name: Option<&str>, mentions: &[String]) -> bool {
    let Some(name) = name else {
        return false;
    };
    let name = name.to_lowercase();
    mentions
        .iter()
        .any(|m| name == *m || (m.chars().count() >= 3 && name.contains(m.as_str())))
}

impl RelevanceScorer {
    /// Scorer for `question`, whose intent tag is `question_tag`.
    #[must_use]
    pub fn new(question: &str, question_tag: &str) -> Self {
        Self::with_scope(extract_scope(question), question_tag)
    }

    #[must_use]
    pub fn with_scope(scope: QuestionScope, question_tag: &str) -> Self {
        let tag = question_tag.trim().to_lowercase();
        Self {
            tag_keywords: keywords(&tag),
            tag,
            scope,
        }
    }

    #[must_use]
    pub fn scope(&self) -> &QuestionScope {
        &self.scope
    }

    /// Composite score of `chunk` at `distance` from the question.
    #[must_use]
    pub fn score(&self, chunk: &Chunk, distance: f32) -> f32 {
        let similarity = 1.0 - distance.clamp(0.0, 1.0);
        similarity * SIMILARITY_WEIGHT
            + self.role_score(chunk.role_tag.as_deref())
            + self.scope_score(chunk)
            + type_weight(chunk.chunk_type)
            + complexity_bonus(chunk.complexity)
    }

    fn role_score(&self, role_tag: Option<&str>) -> f32 {
        let Some(role) = role_tag.map(|r| r.trim().to_lowercase()) else {
            return 0.0;
        };
        if role.is_empty() || self.tag.is_empty() {
            return 0.0;
        }
        if role == self.tag {
            return ROLE_EXACT;
        }
        let mut score = 0.0;
        if role.contains(&self.tag) || self.tag.contains(&role) {
            score += ROLE_CONTAINS;
        }
        let shared = keywords(&role).intersection(&self.tag_keywords).count();
        #[allow(clippy::cast_precision_loss)]
        let shared = shared as f32 * ROLE_KEYWORD;
        (score + shared).min(ROLE_CAP)
    }

    fn scope_score(&self, chunk: &Chunk) -> f32 {
        let path = chunk.file_path.to_lowercase();
        let file_name = path.rsplit('/').next().unwrap_or(&path);
        let file_hit = self.scope.files.iter().any(|f| file_name.contains(f.as_str()))
            || self
                .scope
                .directories
                .iter()
                .any(|d| path.split('/').rev().skip(1).any(|seg| seg == d));

        let mut score = 0.0;
        if file_hit {
            score += SCOPE_MATCH;
        }
        if name_matches(chunk.class_name.as_deref(), &self.scope.classes) {
            score += SCOPE_MATCH;
        }
        if name_matches(chunk.function_name.as_deref(), &self.scope.functions) {
            score += SCOPE_MATCH;
        }
        score
    }

    /// Score and rank `(chunk, distance)` candidates given in retrieval order.
    #[must_use]
    pub fn score_all(&self, candidates: Vec<(Chunk, f32)>) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = candidates
            .into_iter()
            .map(|(chunk, distance)| ScoredChunk {
                score: self.score(&chunk, distance),
                similarity: 1.0 - distance.clamp(0.0, 1.0),
                distance,
                chunk,
            })
            .collect();
        rank(&mut scored);
        scored
    }
}

#[must_use]
pub fn type_weight(chunk_type: ChunkType) -> f32 {
    match chunk_type {
        ChunkType::Class => 2.0,
        ChunkType::Function => 1.5,
        ChunkType::Method => 1.0,
        ChunkType::Block => 0.0,
    }
}

fn complexity_bonus(complexity: u32) -> f32 {
    #[allow(clippy::cast_precision_loss)]
    let c = complexity as f32;
    (c / 10.0).min(1.0)
}

/// Descending score, then ascending distance. Stable, so remaining ties keep
/// retrieval order.
pub fn rank(scored: &mut [ScoredChunk]) {
    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.distance.total_cmp(&b.distance))
    });
}
