//! Directory tree of the indexed files, included in generated prompts.

use std::collections::{BTreeMap, BTreeSet};

#[derive(Default)]
struct Dir {
    dirs: BTreeMap<String, Dir>,
    files: BTreeSet<String>,
}

impl Dir {
    fn insert(&mut self, path: &str) {
        let mut parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty() && *p != ".").collect();
        let Some(file) = parts.pop() else {
            return;
        };
        let mut dir = self;
        for part in parts {
            dir = dir.dirs.entry(part.to_owned()).or_default();
        }
        dir.files.insert(file.to_owned());
    }

    fn render(&self, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        for (name, child) in &self.dirs {
            out.push_str(&indent);
            out.push_str(name);
            out.push_str("/\n");
            child.render(depth + 1, out);
        }
        for file in &self.files {
            out.push_str(&indent);
            out.push_str(file);
            out.push('\n');
        }
    }
}

/// Sorted tree of `paths`: directories before files, two spaces per level.
#[must_use]
pub fn directory_tree<'a>(paths: impl IntoIterator<Item = &'a str>) -> String {
    let mut root = Dir::default();
    for path in paths {
        root.insert(&path.replace('\\', "/"));
    }
    let mut out = String::new();
    root.render(0, &mut out);
    out.truncate(out.trim_end().len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directories_come_before_files() {
        let tree = directory_tree([
            "README.md",
            "src/main.py",
            "src/auth/login.py",
            "docs/guide.md",
            "src/auth/__init__.py",
        ]);
        assert_eq!(
            tree,
            "docs/\n  guide.md\nsrc/\n  auth/\n    __init__.py\n    login.py\n  main.py\nREADME.md"
        );
    }

    #[test]
    fn empty_input_is_empty_tree() {
        assert_eq!(directory_tree([]), "");
    }

    #[test]
    fn backslashes_and_dot_segments_are_normalised() {
        assert_eq!(directory_tree(["./lib\\util.js"]), "lib/\n  util.js");
    }
}
