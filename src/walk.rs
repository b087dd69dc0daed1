//! Local repository reader standing in for a remote fetcher.

use std::path::Path;

use anyhow::Context;
use reposage_index::SourceFile;

/// Every UTF-8 file under `root` that git would track, as repository-relative paths.
///
/// Hidden and ignored files are skipped, as are files over `max_bytes` and
/// files that are not valid UTF-8.
pub fn collect_files(root: &Path, max_bytes: u64) -> anyhow::Result<Vec<SourceFile>> {
    if !root.is_dir() {
        anyhow::bail!("{} is not a directory", root.display());
    }
    let mut files = Vec::new();
    let walker = ignore::WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .require_git(false)
        .sort_by_file_name(std::cmp::Ord::cmp)
        .build();
    for entry in walker.flatten() {
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let path = entry.path();
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        if size > max_bytes {
            tracing::debug!(file = %path.display(), size, "skipping large file");
            continue;
        }
        let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let Ok(content) = String::from_utf8(bytes) else {
            tracing::debug!(file = %path.display(), "skipping non-UTF-8 file");
            continue;
        };
        let rel = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        files.push(SourceFile::new(rel, content));
    }
    Ok(files)
}
