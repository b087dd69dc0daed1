use std::str::FromStr;

use super::{Config, Secret};

/// Parsed value of `key`, or `None` when unset. Unparsable values are logged and ignored.
fn parse_var<T: FromStr>(key: &str) -> Option<T> {
    let v = std::env::var(key).ok()?;
    if let Ok(parsed) = v.trim().parse::<T>() {
        Some(parsed)
    } else {
        tracing::warn!("ignoring invalid {key} value: {v}");
        None
    }
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("REPOSAGE_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("REPOSAGE_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("REPOSAGE_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = std::env::var("REPOSAGE_OPENAI_API_KEY")
            && !v.is_empty()
        {
            self.llm.api_key = Some(Secret::new(v));
        }
        if let Some(n) = parse_var::<usize>("REPOSAGE_INDEX_CONCURRENCY") {
            if n == 0 {
                tracing::warn!("ignoring invalid REPOSAGE_INDEX_CONCURRENCY value: 0");
            } else {
                self.index.concurrency = n;
            }
        }
        if let Some(k) = parse_var("REPOSAGE_INDEX_TOP_K") {
            self.index.top_k = k;
        }
        if let Some(t) = parse_var::<f32>("REPOSAGE_MEMORY_DEDUP_THRESHOLD") {
            if (0.0..=1.0).contains(&t) {
                self.memory.dedup_threshold = t;
            } else {
                tracing::warn!("ignoring invalid REPOSAGE_MEMORY_DEDUP_THRESHOLD value: {t}");
            }
        }
        if let Some(t) = parse_var::<f32>("REPOSAGE_MEMORY_RECALL_THRESHOLD") {
            if (0.0..=1.0).contains(&t) {
                self.memory.recall_threshold = t;
            } else {
                tracing::warn!("ignoring invalid REPOSAGE_MEMORY_RECALL_THRESHOLD value: {t}");
            }
        }
        if let Some(window) = parse_var("REPOSAGE_ASSEMBLER_CONTEXT_WINDOW") {
            self.assembler.model_context_window = window;
        }
        if let Ok(v) = std::env::var("REPOSAGE_QDRANT_URL") {
            self.vector_store.qdrant_url = v;
        }
        if let Ok(v) = std::env::var("REPOSAGE_VECTOR_STORE") {
            if let Ok(backend) = serde_json::from_value(serde_json::Value::String(v.to_lowercase())) {
                self.vector_store.backend = backend;
            } else {
                tracing::warn!("ignoring invalid REPOSAGE_VECTOR_STORE value: {v}");
            }
        }
    }
}
