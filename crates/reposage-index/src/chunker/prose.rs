//! Document strategy: sections and fenced code blocks.

use std::ops::Range;

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use super::{ChunkSink, ChunkerConfig, Entity};
use crate::languages::Lang;

pub(crate) const PLAIN_TEXT: &str = "plain text";
pub(crate) const CODE_BLOCK: &str = "code block";

/// Split on section headers and fences, then window oversized segments.
///
/// Text before the first header is labelled plain text; text after a code
/// block belongs to the enclosing section.
pub(crate) fn chunk(sink: &mut ChunkSink<'_>, config: &ChunkerConfig) {
    for (range, label) in segments(sink.source, sink.lang) {
        sink.push_windows(
            range,
            config.fallback_max_tokens,
            config.fallback_overlap,
            &Entity::labelled(label),
        );
    }
}

fn segments(source: &str, lang: Lang) -> Vec<(Range<usize>, String)> {
    let mut out = match lang {
        Lang::Rst => rst_segments(source),
        _ => markdown_segments(source),
    };
    out.retain(|(range, _)| !source[range.clone()].trim().is_empty());
    out
}

/// Boundaries from the `CommonMark` event stream: ATX and setext headings
/// start sections, fenced code blocks are cut out whole.
fn markdown_segments(source: &str) -> Vec<(Range<usize>, String)> {
    let mut out = Vec::new();
    let mut label = PLAIN_TEXT.to_owned();
    let mut start = 0;
    let mut heading: Option<(usize, String)> = None;

    let parser = Parser::new_ext(source, Options::ENABLE_HEADING_ATTRIBUTES);
    for (event, range) in parser.into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { .. }) => heading = Some((range.start, String::new())),
            Event::Text(text) | Event::Code(text) => {
                if let Some((_, title)) = heading.as_mut() {
                    title.push_str(&text);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if let Some((_, title)) = heading.as_mut() {
                    title.push(' ');
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                let Some((at, title)) = heading.take() else {
                    continue;
                };
                let title = title.trim();
                if title.is_empty() || at < start {
                    continue;
                }
                let previous = std::mem::replace(&mut label, title.to_owned());
                out.push((start..at, previous));
                start = at;
            }
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(_))) if range.start >= start => {
                out.push((start..range.start, label.clone()));
                out.push((range.clone(), CODE_BLOCK.to_owned()));
                start = range.end;
            }
            _ => {}
        }
    }
    out.push((start..source.len(), label));
    out
}

/// reStructuredText titles: a line underlined by a run of one punctuation
/// character at least as long as the title.
fn rst_segments(source: &str) -> Vec<(Range<usize>, String)> {
    let lines: Vec<(usize, &str)> = source
        .split_inclusive('\n')
        .scan(0, |offset, line| {
            let start = *offset;
            *offset += line.len();
            Some((start, line))
        })
        .collect();

    let mut out = Vec::new();
    let mut label = PLAIN_TEXT.to_owned();
    let mut start = 0;
    for (i, &(offset, line)) in lines.iter().enumerate() {
        let next = lines.get(i + 1).map(|(_, l)| *l);
        if let Some(title) = rst_title(line, next) {
            out.push((start..offset, std::mem::replace(&mut label, title)));
            start = offset;
        }
    }
    out.push((start..source.len(), label));
    out
}

fn rst_title(line: &str, next: Option<&str>) -> Option<String> {
    let line = line.trim_end();
    let title = line.trim();
    let underline = next?.trim_end();
    let mark = underline.chars().next()?;
    let is_underline = "=-~^*#+".contains(mark)
        && underline.chars().all(|c| c == mark)
        && underline.chars().count() >= title.chars().count();
    (!title.is_empty() && !line.starts_with(char::is_whitespace) && is_underline)
        .then(|| title.to_owned())
}
