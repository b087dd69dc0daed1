//! Prompt templates and parsing of code-edit completions.

use std::sync::LazyLock;

use regex::Regex;

pub const SYSTEM_PROMPT_QA: &str = "You are a careful software engineer answering questions \
about a code repository. The code context is annotated with file, function, class, line range \
and role metadata. Ground every statement in that context and cite the file, function, class, \
lines and role you rely on. Use the directory structure to explain how the pieces fit together. \
If the context does not contain the answer, say that the information is not in the code instead \
of guessing. Answer in the language of the question.";

pub const SYSTEM_PROMPT_MODIFY: &str = "You are a software engineer specialised in refactoring \
and bug fixes. Apply the requested change to the code in the context and return the complete \
modified file in the form `// FILE: <path>` followed by the full code. Change only what the \
request asks for.";

/// Shown in place of the directory tree when a session has none.
pub const NO_DIRECTORY_STRUCTURE: &str = "(no project structure available)";

static FILE_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*(?://\s*FILE|File|파일명)\s*[:：]\s*([^\n]+)\n").unwrap());

const FULL_FILE_KEYWORDS: &[&str] = &[
    "전체",
    "전체 코드",
    "전체내용",
    "전체 보여",
    "전체 출력",
    "entire file",
    "whole file",
    "full file",
    "full code",
    "full source",
    "complete file",
    "entire code",
    "whole code",
];

fn or_placeholder(directory_structure: &str) -> &str {
    if directory_structure.trim().is_empty() {
        NO_DIRECTORY_STRUCTURE
    } else {
        directory_structure
    }
}

/// User prompt for a question about the repository.
///
/// `recalled` is the output of conversation recall and is omitted when it is
/// empty or the no-prior-conversation sentinel.
#[must_use]
pub fn build_answer_prompt(
    directory_structure: &str,
    context: &str,
    question: &str,
    recalled: Option<&str>,
) -> String {
    let mut prompt = format!(
        "Below are the project directory structure and the code chunks related to the question, \
each annotated with file, function, class, lines and role.\n\n\
[Project directory structure]\n{}\n\n\
[Code context]\n{context}\n\n",
        or_placeholder(directory_structure)
    );
    if let Some(recalled) = recalled.filter(|r| {
        !r.trim().is_empty() && *r != reposage_memory::NO_PRIOR_CONVERSATION
    }) {
        prompt.push_str("[Related earlier conversation]\n");
        prompt.push_str(recalled);
        prompt.push_str("\n\n");
    }
    prompt.push_str("[Question]\n");
    prompt.push_str(question);
    prompt.push_str(
        "\n\nAnswer using the code, metadata and structure above.\n\
- Cite the file, function, class, lines and role tag behind each claim.\n\
- Use code blocks with comments where code helps.\n\
- Explain the overall flow when the question is about a role or feature.\n\
- If the information is not in the code, say so instead of guessing.\n",
    );
    prompt
}

/// User prompt asking for a code modification.
#[must_use]
pub fn build_modify_prompt(directory_structure: &str, context: &str, request: &str) -> String {
    format!(
        "Below are the project directory structure and the code related to a modification \
request.\n\n\
[Project directory structure]\n{}\n\n\
[Code context]\n{context}\n\n\
[Modification request]\n{request}\n\n\
Return the complete modified file in this form:\n\
// FILE: <path>\n\
<full modified code>\n\n\
- Keep the project structure in mind.\n\
- Change only what the request asks for.\n\
- Put any explanation below the code.\n",
        or_placeholder(directory_structure)
    )
}

/// Split a code-edit completion into the named file and its code.
///
/// Recognises `// FILE: <name>` and `File: <name>` headers; without one the
/// whole trimmed text is returned with no file name.
#[must_use]
pub fn parse_code_response(text: &str) -> (Option<String>, String) {
    if let Some(caps) = FILE_HEADER_RE.captures(text)
        && let (Some(header), Some(name)) = (caps.get(0), caps.get(1))
    {
        let name = name.as_str().trim();
        let code = text[header.end()..].trim();
        if !name.is_empty() && !code.is_empty() {
            return (Some(name.to_owned()), strip_fence(code).to_owned());
        }
    }
    (None, text.trim().to_owned())
}

/// Remove a surrounding markdown code fence, if any.
fn strip_fence(code: &str) -> &str {
    let Some(rest) = code.strip_prefix("```") else {
        return code;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end()
        .strip_suffix("```")
        .map_or(body, str::trim_end)
}

/// Whether `question` asks for a whole file rather than an explanation.
#[must_use]
pub fn is_full_file_request(question: &str) -> bool {
    let lower = question.to_lowercase();
    FULL_FILE_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn parses_file_comment_header() {
        let (name, code) =
            parse_code_response("Here you go:\n// FILE: src/auth.py\ndef login():\n    pass\n");
        assert_eq!(name.as_deref(), Some("src/auth.py"));
        assert_eq!(code, "def login():\n    pass");
    }

    #[test]
    fn parses_plain_file_header_and_fence() {
        let (name, code) = parse_code_response("File: app.js\n```js\nconsole.log(1);\n```\n");
        assert_eq!(name.as_deref(), Some("app.js"));
        assert_eq!(code, "console.log(1);");
    }

    #[test]
    fn parses_korean_file_header() {
        let (name, code) = parse_code_response("파일명: main.py\nprint('hi')");
        assert_eq!(name.as_deref(), Some("main.py"));
        assert_eq!(code, "print('hi')");
    }

    #[test]
    fn no_header_returns_whole_text() {
        let (name, code) = parse_code_response("  just an explanation  \n");
        assert!(name.is_none());
        assert_eq!(code, "just an explanation");
    }

    #[test]
    fn detects_full_file_requests() {
        assert!(is_full_file_request("auth.py 전체 코드 보여줘"));
        assert!(is_full_file_request("Show me the FULL CODE of main.rs"));
        assert!(is_full_file_request("print the entire file app.js"));
        assert!(!is_full_file_request("how does login work?"));
    }

    #[test]
    fn answer_prompt_sections() {
        let prompt = build_answer_prompt("src/\n  a.py", "[file: src/a.py]\nx = 1", "what is x?", None);
        assert!(prompt.contains("[Project directory structure]\nsrc/\n  a.py"));
        assert!(prompt.contains("[Code context]\n[file: src/a.py]\nx = 1"));
        assert!(prompt.contains("[Question]\nwhat is x?"));
        assert!(!prompt.contains("[Related earlier conversation]"));
    }

    #[test]
    fn answer_prompt_includes_recall_but_not_sentinel() {
        let with = build_answer_prompt("", "ctx", "q", Some("[related #1 (similarity: 0.90)]\nQ: a\nA: b"));
        assert!(with.contains("[Related earlier conversation]\n[related #1"));
        assert!(with.contains(NO_DIRECTORY_STRUCTURE));

        let without = build_answer_prompt("", "ctx", "q", Some(reposage_memory::NO_PRIOR_CONVERSATION));
        assert!(!without.contains("[Related earlier conversation]"));
    }

    #[test]
    fn modify_prompt_sections() {
        let prompt = build_modify_prompt("a.py", "ctx", "rename x to y");
        assert!(prompt.contains("[Modification request]\nrename x to y"));
        assert!(prompt.contains("// FILE: <path>"));
    }

    proptest! {
        #[test]
        fn headerless_text_is_returned_trimmed(text in "[a-z ]{0,40}") {
            let (name, code) = parse_code_response(&text);
            prop_assert!(name.is_none());
            prop_assert_eq!(code, text.trim());
        }

        #[test]
        fn header_name_and_code_are_split(name in "[a-z]{1,8}/[a-z]{1,8}\\.py", body in "[a-z]{1,20}") {
            let (parsed, code) = parse_code_response(&format!("// FILE: {name}\n{body}\n"));
            prop_assert_eq!(parsed, Some(name));
            prop_assert_eq!(code, body);
        }
    }
}
