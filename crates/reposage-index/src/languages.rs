//! Language detection and chunking strategy selection.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Source language or document kind of an indexed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Python,
    Rust,
    JavaScript,
    TypeScript,
    Java,
    Kotlin,
    Swift,
    Go,
    C,
    Cpp,
    CSharp,
    Php,
    Scala,
    Markdown,
    Rst,
    Text,
}

/// How a file is split into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Parse tree from a tree-sitter grammar.
    Tree,
    /// Definition headers located by pattern, bodies by brace balance.
    Brace,
    /// Section headers and fenced code blocks.
    Prose,
    /// Fixed-size token windows.
    Window,
}

impl Lang {
    /// Identifier stored in chunk metadata.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Rust => "rust",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Java => "java",
            Self::Kotlin => "kotlin",
            Self::Swift => "swift",
            Self::Go => "go",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::CSharp => "csharp",
            Self::Php => "php",
            Self::Scala => "scala",
            Self::Markdown => "markdown",
            Self::Rst => "rst",
            Self::Text => "text",
        }
    }

    /// Get the tree-sitter grammar. Returns `None` if the
    /// corresponding feature is not enabled.
    #[must_use]
    pub fn grammar(self) -> Option<tree_sitter::Language> {
        match self {
            #[cfg(feature = "lang-rust")]
            Self::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            #[cfg(feature = "lang-python")]
            Self::Python => Some(tree_sitter_python::LANGUAGE.into()),
            #[cfg(feature = "lang-js")]
            Self::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            #[cfg(feature = "lang-js")]
            Self::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            #[cfg(feature = "lang-go")]
            Self::Go => Some(tree_sitter_go::LANGUAGE.into()),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    /// Grammar languages fall back to brace matching when their feature is off.
    #[must_use]
    pub fn strategy(self) -> Strategy {
        if self.grammar().is_some() {
            return Strategy::Tree;
        }
        match self {
            Self::Rust
            | Self::JavaScript
            | Self::TypeScript
            | Self::Java
            | Self::Kotlin
            | Self::Swift
            | Self::Go
            | Self::C
            | Self::Cpp
            | Self::CSharp
            | Self::Php
            | Self::Scala => Strategy::Brace,
            Self::Markdown | Self::Rst => Strategy::Prose,
            Self::Python | Self::Text => Strategy::Window,
        }
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Detect language from file extension.
#[must_use]
pub fn detect_language(path: &Path) -> Option<Lang> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "py" | "pyi" => Some(Lang::Python),
        "rs" => Some(Lang::Rust),
        "js" | "jsx" | "mjs" | "cjs" => Some(Lang::JavaScript),
        "ts" | "tsx" | "mts" | "cts" => Some(Lang::TypeScript),
        "java" => Some(Lang::Java),
        "kt" | "kts" => Some(Lang::Kotlin),
        "swift" => Some(Lang::Swift),
        "go" => Some(Lang::Go),
        "c" | "h" => Some(Lang::C),
        "cc" | "cpp" | "cxx" | "hpp" | "hh" | "hxx" => Some(Lang::Cpp),
        "cs" => Some(Lang::CSharp),
        "php" => Some(Lang::Php),
        "scala" | "sc" => Some(Lang::Scala),
        "md" | "markdown" => Some(Lang::Markdown),
        "rst" => Some(Lang::Rst),
        "txt" => Some(Lang::Text),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_language_py() {
        assert_eq!(detect_language(Path::new("app/main.py")), Some(Lang::Python));
    }

    #[test]
    fn detect_language_is_case_insensitive() {
        assert_eq!(detect_language(Path::new("README.MD")), Some(Lang::Markdown));
        assert_eq!(detect_language(Path::new("Main.Java")), Some(Lang::Java));
    }

    #[test]
    fn detect_language_js_variants() {
        for ext in &["js", "jsx", "mjs", "cjs"] {
            let path = format!("file.{ext}");
            assert_eq!(
                detect_language(Path::new(&path)),
                Some(Lang::JavaScript),
                "failed for .{ext}"
            );
        }
    }

    #[test]
    fn detect_language_unknown_ext_returns_none() {
        assert_eq!(detect_language(Path::new("file.xyz")), None);
        assert_eq!(detect_language(Path::new("Makefile")), None);
    }

    #[test]
    fn brace_languages_use_brace_strategy() {
        for lang in [Lang::Java, Lang::Kotlin, Lang::Cpp, Lang::CSharp, Lang::Php] {
            assert_eq!(lang.strategy(), Strategy::Brace, "{lang}");
        }
    }

    #[test]
    fn documents_use_prose_strategy() {
        assert_eq!(Lang::Markdown.strategy(), Strategy::Prose);
        assert_eq!(Lang::Rst.strategy(), Strategy::Prose);
        assert_eq!(Lang::Text.strategy(), Strategy::Window);
    }

    #[test]
    fn grammar_languages_use_tree_strategy() {
        #[cfg(feature = "lang-python")]
        assert_eq!(Lang::Python.strategy(), Strategy::Tree);
        #[cfg(feature = "lang-rust")]
        assert_eq!(Lang::Rust.strategy(), Strategy::Tree);
        #[cfg(not(feature = "lang-rust"))]
        assert_eq!(Lang::Rust.strategy(), Strategy::Brace);
        #[cfg(feature = "lang-js")]
        {
            assert_eq!(Lang::JavaScript.strategy(), Strategy::Tree);
            assert_eq!(Lang::TypeScript.strategy(), Strategy::Tree);
        }
        #[cfg(not(feature = "lang-js"))]
        assert_eq!(Lang::JavaScript.strategy(), Strategy::Brace);
        #[cfg(feature = "lang-go")]
        assert_eq!(Lang::Go.strategy(), Strategy::Tree);
    }

    #[test]
    fn lang_id_matches_display() {
        for lang in [Lang::Python, Lang::CSharp, Lang::Markdown, Lang::Text] {
            assert!(!lang.id().is_empty());
            assert_eq!(lang.to_string(), lang.id());
        }
    }
}
