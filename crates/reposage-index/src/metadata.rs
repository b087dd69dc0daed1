//! Flat scalar metadata stored next to each chunk vector.
//!
//! Vector stores reject `null` and nested values, so optional fields are
//! written as `""` (text) or `-1` (integers) and read back as absent.

use std::collections::HashMap;

use serde_json::Value;

use crate::chunker::{Chunk, ChunkType};
use crate::indexer::SourceFile;
use crate::languages::{Lang, detect_language};

pub type Metadata = HashMap<String, Value>;

/// Payload key holding the raw chunk text.
pub const DOCUMENT_FIELD: &str = "document";

fn text(value: Option<&str>) -> Value {
    Value::String(value.unwrap_or_default().to_owned())
}

fn int(value: Option<usize>) -> Value {
    value
        .and_then(|v| i64::try_from(v).ok())
        .map_or(Value::from(-1), Value::from)
}

/// A JSON array string, or `""` when empty. Base names may contain commas (`Generic[K, V]`).
fn list(values: &[String]) -> Value {
    if values.is_empty() {
        return Value::String(String::new());
    }
    Value::Array(values.iter().cloned().map(Value::String).collect())
}

/// Replace `null` with `""` and serialize arrays or objects to a JSON string.
#[must_use]
pub fn coerce_scalar(value: Value) -> Value {
    match value {
        Value::Null => Value::String(String::new()),
        Value::Array(_) | Value::Object(_) => Value::String(value.to_string()),
        scalar => scalar,
    }
}

/// Metadata written for `chunk`, cut from `file`.
#[must_use]
pub fn chunk_metadata(chunk: &Chunk, file: &SourceFile) -> Metadata {
    let fields = [
        ("path", text(Some(chunk.file_path.as_str()))),
        ("file_name", text(Some(file.file_name.as_str()))),
        ("file_type", text(Some(file.file_type.as_str()))),
        ("sha", text(file.sha.as_deref())),
        ("source_url", text(file.source_url.as_deref())),
        ("chunk_index", int(Some(chunk.chunk_index))),
        ("function_name", text(chunk.function_name.as_deref())),
        ("class_name", text(chunk.class_name.as_deref())),
        ("parent_entity", text(chunk.parent_entity.as_deref())),
        ("inheritance", list(&chunk.inheritance)),
        ("start_line", int(Some(chunk.start_line))),
        ("end_line", int(Some(chunk.end_line))),
        ("token_start", int(Some(chunk.token_start))),
        ("token_end", int(Some(chunk.token_end))),
        ("token_count", int(Some(chunk.token_count))),
        ("role_tag", text(chunk.role_tag.as_deref())),
        ("chunk_type", Value::String(chunk.chunk_type.as_str().to_owned())),
        ("complexity", Value::from(chunk.complexity)),
        ("label", text(chunk.label.as_deref())),
        ("language", Value::String(chunk.language.id().to_owned())),
    ];
    fields
        .into_iter()
        .map(|(k, v)| (k.to_owned(), coerce_scalar(v)))
        .collect()
}

fn get_text(meta: &Metadata, key: &str) -> Option<String> {
    meta.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn get_int(meta: &Metadata, key: &str) -> Option<usize> {
    meta.get(key)
        .and_then(Value::as_i64)
        .and_then(|v| usize::try_from(v).ok())
}

/// Rebuild a chunk from a stored record. Missing fields take neutral defaults.
#[must_use]
pub fn chunk_from_metadata(id: &str, document: &str, meta: &Metadata) -> Chunk {
    let file_path = get_text(meta, "path").unwrap_or_default();
    let language = meta
        .get("language")
        .and_then(|v| serde_json::from_value::<Lang>(v.clone()).ok())
        .or_else(|| detect_language(std::path::Path::new(&file_path)))
        .unwrap_or(Lang::Text);
    let start_line = get_int(meta, "start_line").unwrap_or(1);
    Chunk {
        id: id.to_owned(),
        chunk_index: get_int(meta, "chunk_index").unwrap_or_default(),
        text: document.to_owned(),
        token_count: get_int(meta, "token_count").unwrap_or_default(),
        token_start: get_int(meta, "token_start").unwrap_or_default(),
        token_end: get_int(meta, "token_end").unwrap_or_default(),
        start_line,
        end_line: get_int(meta, "end_line").unwrap_or(start_line).max(start_line),
        chunk_type: get_text(meta, "chunk_type")
            .and_then(|t| ChunkType::parse(&t))
            .unwrap_or_default(),
        function_name: get_text(meta, "function_name"),
        class_name: get_text(meta, "class_name"),
        parent_entity: get_text(meta, "parent_entity"),
        inheritance: get_text(meta, "inheritance")
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
        complexity: meta
            .get("complexity")
            .and_then(Value::as_u64)
            .and_then(|c| u32::try_from(c).ok())
            .unwrap_or(1)
            .max(1),
        label: get_text(meta, "label"),
        language,
        role_tag: get_text(meta, "role_tag"),
        file_path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::sample_chunk;

    fn sample_file() -> SourceFile {
        SourceFile {
            path: "src/auth.py".into(),
            content: String::new(),
            file_name: "auth.py".into(),
            file_type: "py".into(),
            sha: None,
            source_url: Some("https://example.com/src/auth.py".into()),
        }
    }

    #[test]
    fn every_field_is_a_scalar() {
        let meta = chunk_metadata(&sample_chunk(), &sample_file());
        assert_eq!(meta.len(), 20);
        assert!(
            meta.values()
                .all(|v| v.is_string() || v.is_number() || v.is_boolean())
        );
    }

    #[test]
    fn optional_fields_are_coerced() {
        let mut chunk = sample_chunk();
        chunk.role_tag = None;
        chunk.label = None;
        let meta = chunk_metadata(&chunk, &sample_file());
        assert_eq!(meta["sha"], "");
        assert_eq!(meta["role_tag"], "");
        assert_eq!(meta["label"], "");
        assert_eq!(int(None), Value::from(-1));
    }

    #[test]
    fn coerce_scalar_flattens_nested_values() {
        assert_eq!(coerce_scalar(Value::Null), Value::String(String::new()));
        assert_eq!(
            coerce_scalar(serde_json::json!(["a", "b"])),
            Value::String("[\"a\",\"b\"]".into())
        );
        assert_eq!(coerce_scalar(Value::from(3)), Value::from(3));
    }

    #[test]
    fn chunk_survives_store_round_trip() {
        let mut chunk = sample_chunk();
        chunk.inheritance = vec!["Base".into(), "Mixin".into()];
        chunk.role_tag = Some("login check".into());
        let meta = chunk_metadata(&chunk, &sample_file());
        let back = chunk_from_metadata(&chunk.id, &chunk.text, &meta);
        assert_eq!(back, chunk);
    }

    #[test]
    fn generic_bases_keep_their_commas() {
        let mut chunk = sample_chunk();
        chunk.inheritance = vec!["Generic[K, V]".into(), "Mapping[str, int]".into()];
        let meta = chunk_metadata(&chunk, &sample_file());
        assert!(meta["inheritance"].is_string());
        let back = chunk_from_metadata(&chunk.id, &chunk.text, &meta);
        assert_eq!(back.inheritance, chunk.inheritance);
    }

    #[test]
    fn no_bases_is_stored_as_empty_text() {
        let mut chunk = sample_chunk();
        chunk.inheritance.clear();
        let meta = chunk_metadata(&chunk, &sample_file());
        assert_eq!(meta["inheritance"], "");
        let back = chunk_from_metadata(&chunk.id, &chunk.text, &meta);
        assert!(back.inheritance.is_empty());
    }

    #[test]
    fn sentinel_integers_read_as_defaults() {
        let mut meta = Metadata::new();
        meta.insert("path".into(), Value::from("lib/x.js"));
        meta.insert("start_line".into(), Value::from(-1));
        meta.insert("complexity".into(), Value::from(0));
        let chunk = chunk_from_metadata("lib/x.js_0", "x()", &meta);
        assert_eq!(chunk.start_line, 1);
        assert_eq!(chunk.end_line, 1);
        assert_eq!(chunk.complexity, 1);
        assert_eq!(chunk.language, Lang::JavaScript);
        assert_eq!(chunk.chunk_type, ChunkType::Block);
    }
}
