use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static PUNCT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\p{P}+").unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Canonical question form used for hashing and embedding.
///
/// NFKC, lowercase, punctuation removed, whitespace collapsed and trimmed.
#[must_use]
pub fn normalize_question(question: &str) -> String {
    let folded: String = question.nfkc().collect::<String>().to_lowercase();
    let stripped = PUNCT_RE.replace_all(&folded, "");
    WS_RE.replace_all(stripped.trim(), " ").into_owned()
}

/// Hex BLAKE3 digest of the normalized question.
#[must_use]
pub fn question_hash(question: &str) -> String {
    blake3::hash(normalize_question(question).as_bytes())
        .to_hex()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_and_case() {
        assert_eq!(
            normalize_question("  How   does\tLOGIN\nwork?  "),
            "how does login work"
        );
    }

    #[test]
    fn strips_punctuation_in_korean() {
        assert_eq!(
            normalize_question("로그인 함수는 어떻게 작동하나요?"),
            "로그인 함수는 어떻게 작동하나요"
        );
    }

    #[test]
    fn nfkc_folds_fullwidth_forms() {
        assert_eq!(normalize_question("ＬＯＧＩＮ"), "login");
    }

    #[test]
    fn hash_ignores_surface_differences() {
        assert_eq!(question_hash("What is main?"), question_hash("what is   MAIN"));
        assert_ne!(question_hash("what is main"), question_hash("what is login"));
    }

    #[test]
    fn punctuation_only_normalizes_to_empty() {
        assert_eq!(normalize_question("?!..."), "");
    }
}
