//! Contextualized embedding text and display headers.
//!
//! The vector is computed from the chunk text prefixed with its file path,
//! enclosing scope and language. The stored document stays the raw chunk
//! text.

use crate::chunker::Chunk;

/// `Class > function` for structural chunks, the label for document chunks.
#[must_use]
pub(crate) fn scope_chain(chunk: &Chunk) -> String {
    let parts: Vec<&str> = [
        chunk.class_name.as_deref(),
        chunk.function_name.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect();
    if parts.is_empty() {
        chunk.label.clone().unwrap_or_default()
    } else {
        parts.join(" > ")
    }
}

/// Generate text optimized for embedding (not for display).
#[must_use]
pub(crate) fn contextualize_for_embedding(chunk: &Chunk) -> String {
    let mut text = String::with_capacity(chunk.text.len() + 128);

    text.push_str("# ");
    text.push_str(&chunk.file_path);
    text.push('\n');

    let scope = scope_chain(chunk);
    if !scope.is_empty() {
        text.push_str("# Scope: ");
        text.push_str(&scope);
        text.push('\n');
    }

    text.push_str("# Language: ");
    text.push_str(chunk.language.id());
    text.push('\n');

    text.push_str(&chunk.text);
    text
}

/// Short header for log lines.
#[must_use]
pub(crate) fn chunk_display_header(chunk: &Chunk) -> String {
    let scope = scope_chain(chunk);
    let name = if scope.is_empty() {
        chunk.chunk_type.as_str()
    } else {
        scope.as_str()
    };
    format!(
        "{} :: {} (lines {}-{})",
        chunk.file_path, name, chunk.start_line, chunk.end_line
    )
}
