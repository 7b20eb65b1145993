//! Post-processing of model output.

use fancy_regex::Regex;
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use serde_json::Value;
use std::sync::LazyLock;

static CODE_FENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)\s*```$").expect("valid regex")
});

static JSON_SPAN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[.*\]|\{.*\}").expect("valid regex"));

static BLANK_LINES_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Render markdown as plain text, keeping paragraph and list item breaks.
#[inline]
pub fn strip_markdown(markdown: &str) -> String {
    let mut output = String::with_capacity(markdown.len());

    for event in Parser::new(markdown) {
        match event {
            Event::Text(text) | Event::Code(text) => output.push_str(&text),
            Event::SoftBreak => output.push(' '),
            Event::HardBreak => output.push('\n'),
            Event::Start(Tag::Item) => {
                if !output.is_empty() && !output.ends_with('\n') {
                    output.push('\n');
                }
            }
            Event::End(TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::CodeBlock) => {
                output.push_str("\n\n");
            }
            Event::End(TagEnd::Item) => {
                if !output.ends_with('\n') {
                    output.push('\n');
                }
            }
            Event::Rule => output.push_str("\n\n"),
            _ => {}
        }
    }

    BLANK_LINES_REGEX
        .replace_all(output.trim(), "\n\n")
        .into_owned()
}

/// Leniently pull a JSON value out of model output.
///
/// Accepts bare JSON, JSON inside a markdown code fence, or JSON embedded in
/// prose (the outermost `[...]` or `{...}` span). Returns `None` when nothing
/// parses.
#[inline]
pub fn parse_llm_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let unfenced = match CODE_FENCE_REGEX.captures(trimmed) {
        Ok(Some(captures)) => captures
            .get(1)
            .map_or(trimmed, |inner| inner.as_str().trim()),
        _ => trimmed,
    };

    if let Ok(value) = serde_json::from_str(unfenced) {
        return Some(value);
    }

    match JSON_SPAN_REGEX.find(unfenced) {
        Ok(Some(span)) => serde_json::from_str(span.as_str()).ok(),
        _ => None,
    }
}
