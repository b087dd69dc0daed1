//! Brace strategy for languages without a bundled grammar, and for grammar
//! languages built without their `lang-*` feature.
//!
//! Definition headers are found line by line with regexes; a body ends where
//! the brace opened after the header is balanced again. Strings, comments and
//! regex literals are skipped while balancing.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::{ChunkSink, ChunkType, ChunkerConfig, Definition, Entity};
use crate::languages::Lang;

static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:(?:export|default|public|private|protected|internal|abstract|final|static|sealed|open|data|partial|pub(?:\([^)]*\))?)\s+)*(?:class|interface|struct|enum|trait|object)\s+(\w+)([^{;]*)",
    )
    .unwrap()
});

static GO_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*type\s+(\w+)\s+(?:struct|interface)\b()").unwrap());

static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:(?:export|default|public|private|protected|internal|static|open|override|suspend|inline|final|abstract|async|unsafe|extern|const|pub(?:\([^)]*\))?)\s+)*(?:function\b\s*\*?|func\b|fun\b|fn\b|def\b)\s*(?:\(([^)]*)\)\s*)?(?:<[^>]*>\s*)?(?:[\w.]+\.)?(\w+)\s*(?:<[^>]*>)?\s*\(([^)]*)\)",
    )
    .unwrap()
});

static ARROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:export\s+)?(?:const|let|var)\s+(\w+)\s*(?::[^=]+)?=\s*(?:async\s+)?(?:\(([^)]*)\)|(\w+))\s*(?::\s*[^=]+)?=>",
    )
    .unwrap()
});

/// Return-type-first declarations in C-family languages.
static TYPED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*((?:[\w:<>\[\],.*&?]+\s+)+)[*&]*(\w+)\s*\(([^)]*)\)\s*(?:const\s*)?(?:throws\s+[\w.,\s]+)?(?:\{.*)?$",
    )
    .unwrap()
});

/// Method headers inside a class body; the opening brace must be on the line.
static METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*((?:[\w@<>\[\],.?*&:]+\s+)*?)(\w+)\s*\(([^)]*)\)\s*(?::\s*[^{;=]+)?(?:throws\s+[\w.,\s]+)?\{",
    )
    .unwrap()
});

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?:import|require|#include|using|package)\b|export\s+(?:\*|\{[^}]*\}).*\bfrom\b|(?:const|let|var)\s+[\w{},\s]+=\s*require\s*\()",
    )
    .unwrap()
});

static BRANCH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:if|for|foreach|while|switch|catch)\b").unwrap());

const RESERVED: &[&str] = &[
    "if", "for", "foreach", "while", "switch", "catch", "return", "sizeof", "using", "lock",
    "synchronized", "function", "else", "do", "try", "new", "await", "yield", "throw", "case",
];

const ACCESS: &[&str] = &["public", "private", "protected", "internal", "virtual"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderKind {
    Class,
    Function,
}

#[derive(Debug, Clone)]
struct Header {
    kind: HeaderKind,
    name: String,
    /// Go receiver type, which makes the function a method.
    receiver: Option<String>,
    /// Parameters for functions, base types for classes.
    list: Vec<String>,
    /// Byte length of the matched header within its line.
    matched: usize,
}

/// Byte range of a braced body: `open` is the `{`, `end` is one past the matching `}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Block {
    open: usize,
    end: usize,
}

pub(crate) fn chunk(sink: &mut ChunkSink<'_>, config: &ChunkerConfig) {
    let source = sink.source;
    let typed = matches!(sink.lang, Lang::Java | Lang::C | Lang::Cpp | Lang::CSharp);
    let imports = source
        .lines()
        .filter(|l| IMPORT_RE.is_match(l))
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");

    let mut residual: Option<usize> = None;
    let mut pos = 0;
    while pos < source.len() {
        let next = line_end(source, pos);
        let line = &source[pos..next];
        if let Some(header) = top_level_header(line, typed)
            && let Some(block) = find_block(source, pos + header.matched)
        {
            flush_residual(sink, config, &mut residual, pos);
            emit(sink, config, &imports, &header, pos, block);
            pos = line_end(source, block.end);
            continue;
        }
        if IMPORT_RE.is_match(line) {
            flush_residual(sink, config, &mut residual, pos);
        } else if residual.is_none() && !line.trim().is_empty() && !is_comment(line) {
            residual = Some(pos);
        }
        pos = next;
    }
    flush_residual(sink, config, &mut residual, source.len());
}

fn emit(
    sink: &mut ChunkSink<'_>,
    config: &ChunkerConfig,
    imports: &str,
    header: &Header,
    start: usize,
    block: Block,
) {
    let text = &sink.source[start..block.end];
    let complexity = complexity(header.list.len(), text);
    let entity = match (header.kind, &header.receiver) {
        (HeaderKind::Class, _) => Entity {
            chunk_type: ChunkType::Class,
            class_name: Some(header.name.clone()),
            inheritance: header.list.clone(),
            complexity,
            ..Entity::default()
        },
        (HeaderKind::Function, Some(receiver)) => Entity {
            chunk_type: ChunkType::Method,
            function_name: Some(header.name.clone()),
            class_name: Some(receiver.clone()),
            parent_entity: Some(receiver.clone()),
            complexity,
            ..Entity::default()
        },
        (HeaderKind::Function, None) => Entity {
            chunk_type: ChunkType::Function,
            function_name: Some(header.name.clone()),
            complexity,
            ..Entity::default()
        },
    };
    let definition = Definition {
        range: start..block.end,
        signature: start..block.open + 1,
        docs: None,
        body: block.open + 1..block.end,
        entity,
    };
    sink.emit_definition(&definition, imports, config);

    if header.kind == HeaderKind::Class {
        let (max_tokens, overlap) = config.budget_for(complexity);
        class_methods(sink, &definition, &header.name, max_tokens / 2, overlap / 2);
    }
}

/// Lighter pass over a class body: each method is windowed at half the class budget.
fn class_methods(
    sink: &mut ChunkSink<'_>,
    class: &Definition,
    class_name: &str,
    max_tokens: usize,
    overlap: usize,
) {
    let source = sink.source;
    let mut pos = line_end(source, class.body.start);
    while pos < class.range.end {
        let next = line_end(source, pos);
        let line = &source[pos..next];
        if let Some((name, params, matched)) = method_header(line)
            && let Some(block) = find_block(source, pos + matched)
            && block.end <= class.range.end
        {
            let entity = Entity {
                chunk_type: ChunkType::Method,
                function_name: Some(name),
                class_name: Some(class_name.to_owned()),
                parent_entity: Some(class_name.to_owned()),
                complexity: complexity(params, &source[pos..block.end]),
                ..Entity::default()
            };
            sink.push_windows(pos..block.end, max_tokens, overlap, &entity);
            pos = line_end(source, block.end);
            continue;
        }
        pos = next;
    }
}

fn flush_residual(
    sink: &mut ChunkSink<'_>,
    config: &ChunkerConfig,
    residual: &mut Option<usize>,
    end: usize,
) {
    if let Some(start) = residual.take() {
        sink.push_windows(
            start..end,
            config.fallback_max_tokens,
            config.fallback_overlap,
            &Entity::default(),
        );
    }
}

fn complexity(arity: usize, text: &str) -> u32 {
    let branches = BRANCH_RE.find_iter(text).count();
    u32::try_from(1 + arity + branches).unwrap_or(u32::MAX)
}

fn top_level_header(line: &str, typed: bool) -> Option<Header> {
    let line = line.trim_end();
    if let Some(caps) = CLASS_RE.captures(line).or_else(|| GO_TYPE_RE.captures(line)) {
        return Some(Header {
            kind: HeaderKind::Class,
            name: caps[1].to_owned(),
            receiver: None,
            list: caps.get(2).map(|m| bases(m.as_str())).unwrap_or_default(),
            matched: match_end(&caps),
        });
    }
    if let Some(caps) = FUNCTION_RE.captures(line) {
        return Some(Header {
            kind: HeaderKind::Function,
            name: caps[2].to_owned(),
            receiver: caps.get(1).and_then(|m| receiver_type(m.as_str())),
            list: params(&caps[3]),
            matched: match_end(&caps),
        });
    }
    if let Some(caps) = ARROW_RE.captures(line) {
        let list = match (caps.get(2), caps.get(3)) {
            (Some(p), _) => params(p.as_str()),
            (None, Some(single)) => vec![single.as_str().to_owned()],
            (None, None) => Vec::new(),
        };
        return Some(Header {
            kind: HeaderKind::Function,
            name: caps[1].to_owned(),
            receiver: None,
            list,
            matched: match_end(&caps),
        });
    }
    if typed
        && !line.trim_end().ends_with(';')
        && let Some(caps) = TYPED_RE.captures(line)
        && !caps[1].split_whitespace().any(|w| RESERVED.contains(&w))
        && !RESERVED.contains(&&caps[2])
    {
        let name_end = caps.get(3).map_or(line.len(), |m| m.end());
        return Some(Header {
            kind: HeaderKind::Function,
            name: caps[2].to_owned(),
            receiver: None,
            list: params(&caps[3]),
            matched: name_end,
        });
    }
    None
}

fn method_header(line: &str) -> Option<(String, usize, usize)> {
    let line = line.trim_end();
    if let Some(caps) = FUNCTION_RE.captures(line) {
        let params = params(&caps[3]).len();
        return Some((caps[2].to_owned(), params, caps.get(3).map_or(0, |m| m.end())));
    }
    let caps = METHOD_RE.captures(line)?;
    if caps[1].split_whitespace().any(|w| RESERVED.contains(&w)) || RESERVED.contains(&&caps[2]) {
        return None;
    }
    let params = params(&caps[3]).len();
    Some((caps[2].to_owned(), params, caps.get(3).map_or(0, |m| m.end())))
}

fn match_end(caps: &Captures<'_>) -> usize {
    caps.get(0).map_or(0, |m| m.end())
}

fn params(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Base types named after `extends`, `implements` or `:` in a class header.
fn bases(rest: &str) -> Vec<String> {
    let mut flat = String::with_capacity(rest.len());
    let mut depth = 0usize;
    for c in rest.chars() {
        match c {
            '<' | '(' => depth += 1,
            '>' | ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => flat.push(c),
            _ => {}
        }
    }

    let mut out = Vec::new();
    let mut collecting = false;
    for token in flat
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        match token {
            "extends" | "implements" | ":" => collecting = true,
            "where" => break,
            t if ACCESS.contains(&t) => {}
            t => {
                if let Some(name) = t.strip_prefix(':') {
                    collecting = true;
                    if !name.is_empty() {
                        out.push(name.to_owned());
                    }
                } else if collecting {
                    out.push(t.to_owned());
                }
            }
        }
    }
    out
}

fn receiver_type(receiver: &str) -> Option<String> {
    receiver
        .split_whitespace()
        .last()
        .map(|t| t.trim_start_matches(['*', '&']).to_owned())
        .filter(|t| !t.is_empty())
}

fn is_comment(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("//") || t.starts_with("/*") || t.starts_with('*')
}

fn line_end(source: &str, from: usize) -> usize {
    source[from..].find('\n').map_or(source.len(), |i| from + i + 1)
}

/// Locate the body opened after `from` and its matching close.
///
/// The opening brace must come before any `;` and within the next line, so
/// declarations without a body yield `None`. An unbalanced body runs to the
/// end of the source.
fn find_block(source: &str, from: usize) -> Option<Block> {
    let bytes = source.as_bytes();
    let mut i = from;
    let mut newlines = 0;
    let open = loop {
        match *bytes.get(i)? {
            b'{' => break i,
            b';' => return None,
            b'\n' => {
                newlines += 1;
                if newlines > 1 {
                    return None;
                }
            }
            b'"' | b'\'' | b'`' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = skip_line_comment(bytes, i);
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = skip_block_comment(bytes, i);
                continue;
            }
            b'/' => {
                if let Some(next) = skip_regex(bytes, i) {
                    i = next;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    };

    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(Block { open, end: i + 1 });
                }
            }
            b'"' | b'\'' | b'`' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = skip_line_comment(bytes, i);
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = skip_block_comment(bytes, i);
                continue;
            }
            b'/' => {
                if let Some(next) = skip_regex(bytes, i) {
                    i = next;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }
    Some(Block {
        open,
        end: bytes.len(),
    })
}

/// Index after the closing quote. A quote left open on its line (template
/// literals excepted) is treated as an ordinary character.
fn skip_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut j = start + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 2,
            b if b == quote => return j + 1,
            b'\n' if quote != b'`' => return start + 1,
            _ => j += 1,
        }
    }
    start + 1
}

/// Index after a regex literal opened at `start`, or `None` when the slash
/// reads as division. A literal may only follow an operator or an opening
/// delimiter and must close on its own line.
fn skip_regex(bytes: &[u8], start: usize) -> Option<usize> {
    let before = bytes[..start].iter().rev().find(|b| !b.is_ascii_whitespace());
    if !matches!(
        before,
        None | Some(b'(' | b',' | b'=' | b':' | b'[' | b'!' | b'&' | b'|' | b'?' | b'{' | b';')
    ) {
        return None;
    }
    let mut in_class = false;
    let mut j = start + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 1,
            b'[' => in_class = true,
            b']' => in_class = false,
            b'/' if !in_class => return Some(j + 1),
            b'\n' => return None,
            _ => {}
        }
        j += 1;
    }
    None
}

/// Index of the newline ending the comment, so line counting still sees it.
fn skip_line_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |p| start + p)
}

fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start + 2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map_or(bytes.len(), |p| start + 2 + p + 2)
}
