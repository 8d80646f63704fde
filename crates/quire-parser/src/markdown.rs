//! Markdown to HTML conversion using pulldown-cmark.

use std::{collections::HashMap, fmt, sync::LazyLock};

use pulldown_cmark::{
    CowStr, Event, LinkType, Options, Parser, Tag, TagEnd, TextMergeStream, html,
};
use regex::Regex;
use thiserror::Error;

use crate::validate::{FENCE, is_fence, missing_bullet_space, missing_heading_space};

/// Bare URLs turned into links.
static BARE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"]+"#).expect("valid regex"));

/// Conversion errors. Never returned to callers of [`MarkdownConverter::convert`].
#[derive(Debug, Error)]
enum ConvertError {
    #[error("failed to write HTML: {0}")]
    Render(#[from] fmt::Error),
}

/// Markdown converter.
///
/// Tables, strikethrough, task lists, definition lists, footnotes and smart
/// punctuation are enabled. Soft breaks render as `<br />`, bare URLs become
/// links and every heading gets an anchor id.
#[derive(Debug, Clone)]
pub struct MarkdownConverter {
    options: Options,
}

impl Default for MarkdownConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownConverter {
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_DEFINITION_LIST);
        options.insert(Options::ENABLE_SMART_PUNCTUATION);
        options.insert(Options::ENABLE_HEADING_ATTRIBUTES);

        Self { options }
    }

    /// Convert a document body to sanitized HTML.
    ///
    /// A blank body yields an empty string. If rendering fails the escaped
    /// input is returned instead.
    pub fn convert(&self, body: &str) -> String {
        if body.trim().is_empty() {
            return String::new();
        }

        let source = preprocess(body);
        match self.render(&source) {
            Ok(html) => postprocess(&html),
            Err(e) => {
                tracing::warn!(error = %e, "markdown conversion failed, using escaped source");
                html_escape(&source)
            }
        }
    }

    fn render(&self, source: &str) -> Result<String, ConvertError> {
        let parser = Parser::new_ext(source, self.options).map(|event| match event {
            Event::SoftBreak => Event::HardBreak,
            other => other,
        });
        let mut events: Vec<Event<'_>> = TextMergeStream::new(parser).collect();
        assign_heading_ids(&mut events);
        let events = linkify(events);

        let mut out = String::with_capacity(source.len() * 3 / 2);
        html::write_html_fmt(&mut out, events.into_iter())?;
        Ok(out)
    }
}

/// Repair common authoring slips before parsing.
///
/// Line endings are normalized to `\n`, a space is inserted after heading
/// hashes and list bullets that lack one, and an unterminated fence is
/// closed. Fenced code is left alone.
pub fn preprocess(body: &str) -> String {
    let normalized = body.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(normalized.len() + 8);
    let mut in_fence = false;

    for (idx, line) in normalized.split('\n').enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        if is_fence(line) {
            in_fence = !in_fence;
            out.push_str(line);
            continue;
        }
        if in_fence {
            out.push_str(line);
            continue;
        }

        if missing_heading_space(line) {
            let hashes = line.len() - line.trim_start_matches('#').len();
            out.push_str(&line[..hashes]);
            out.push(' ');
            out.push_str(&line[hashes..]);
        } else if missing_bullet_space(line) {
            out.push_str(&line[..1]);
            out.push(' ');
            out.push_str(&line[1..]);
        } else {
            out.push_str(line);
        }
    }

    if in_fence {
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(FENCE);
        out.push('\n');
    }
    out
}

/// Neutralize script tags and `javascript:` URIs.
fn postprocess(html: &str) -> String {
    html.replace("<script", "&lt;script")
        .replace("</script>", "&lt;/script&gt;")
        .replace("javascript:", "")
}

/// Give every heading without an explicit id one derived from its text.
fn assign_heading_ids(events: &mut [Event<'_>]) {
    let mut seen: HashMap<String, usize> = HashMap::new();

    for idx in 0..events.len() {
        let Event::Start(Tag::Heading { id, .. }) = &events[idx] else {
            continue;
        };
        if let Some(explicit) = id {
            *seen.entry(explicit.to_string()).or_default() += 1;
            continue;
        }

        let mut text = String::new();
        for event in &events[idx + 1..] {
            match event {
                Event::End(TagEnd::Heading(_)) => break,
                Event::Text(t) | Event::Code(t) => text.push_str(t),
                _ => {}
            }
        }

        let mut base = slugify(&text);
        if base.is_empty() {
            base = "section".to_string();
        }
        let count = seen.entry(base.clone()).or_default();
        let unique = if *count == 0 {
            base
        } else {
            format!("{base}-{count}")
        };
        *count += 1;

        if let Event::Start(Tag::Heading { id, .. }) = &mut events[idx] {
            *id = Some(CowStr::from(unique));
        }
    }
}

/// Wrap bare URLs in text outside links and code blocks.
fn linkify(events: Vec<Event<'_>>) -> Vec<Event<'_>> {
    let mut out = Vec::with_capacity(events.len());
    let mut link_depth = 0usize;
    let mut in_code = false;

    for event in events {
        match &event {
            Event::Start(Tag::Link { .. } | Tag::Image { .. }) => link_depth += 1,
            Event::End(TagEnd::Link | TagEnd::Image) => link_depth = link_depth.saturating_sub(1),
            Event::Start(Tag::CodeBlock(_)) => in_code = true,
            Event::End(TagEnd::CodeBlock) => in_code = false,
            Event::Text(text) if link_depth == 0 && !in_code && BARE_URL.is_match(text) => {
                split_urls(text, &mut out);
                continue;
            }
            _ => {}
        }
        out.push(event);
    }
    out
}

fn split_urls<'a>(text: &str, out: &mut Vec<Event<'a>>) {
    let mut last = 0;
    for found in BARE_URL.find_iter(text) {
        let url = found
            .as_str()
            .trim_end_matches(['.', ',', ';', ':', '!', '?', ')', '\'']);
        if url.len() <= "https://".len() {
            continue;
        }
        let start = found.start();
        let end = start + url.len();
        if start > last {
            out.push(Event::Text(CowStr::from(text[last..start].to_string())));
        }
        out.push(Event::Start(Tag::Link {
            link_type: LinkType::Autolink,
            dest_url: CowStr::from(url.to_string()),
            title: CowStr::from(""),
            id: CowStr::from(""),
        }));
        out.push(Event::Text(CowStr::from(url.to_string())));
        out.push(Event::End(TagEnd::Link));
        last = end;
    }
    if last < text.len() {
        out.push(Event::Text(CowStr::from(text[last..].to_string())));
    }
}

/// Escape HTML special characters.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Convert heading text to an anchor id.
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c.is_whitespace() || c == '-' || c == '_' {
                Some('-')
            } else {
                None
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(body: &str) -> String {
        MarkdownConverter::new().convert(body)
    }

    #[test]
    fn test_empty_body() {
        assert_eq!(convert(""), "");
        assert_eq!(convert("  \n\t\n"), "");
    }

    #[test]
    fn test_basic_blocks() {
        let html = convert("# Hello World\n\nThis is a **test**.");
        assert!(html.contains(r#"<h1 id="hello-world">Hello World</h1>"#));
        assert!(html.contains("<p>This is a <strong>test</strong>.</p>"));
    }

    #[test]
    fn test_heading_ids_are_unique() {
        let html = convert("## Setup\n\n## Setup\n\n## Setup {#custom}\n");
        assert!(html.contains(r#"id="setup""#));
        assert!(html.contains(r#"id="setup-1""#));
        assert!(html.contains(r#"id="custom""#));
    }

    #[test]
    fn test_cjk_heading_id() {
        let html = convert("## 快速 开始");
        assert!(html.contains(r#"id="快速-开始""#));
    }

    #[test]
    fn test_soft_breaks_render_hard() {
        let html = convert("line one\nline two");
        assert!(html.contains("line one<br />"));
    }

    #[test]
    fn test_extensions() {
        let html = convert("| a | b |\n|---|---|\n| 1 | 2 |\n\n~~gone~~\n\n- [x] done\n");
        assert!(html.contains("<table>"));
        assert!(html.contains("<del>gone</del>"));
        assert!(html.contains("checkbox"));

        let html = convert("Note[^1]\n\n[^1]: The footnote.\n");
        assert!(html.contains("footnote"));

        let html = convert("Term\n: Definition\n");
        assert!(html.contains("<dl>"));
        assert!(html.contains("<dd>"));
    }

    #[test]
    fn test_typographic_quotes() {
        let html = convert("\"quoted\" -- text");
        assert!(html.contains('\u{201c}'));
        assert!(html.contains('\u{2013}'));
    }

    #[test]
    fn test_bare_urls_become_links() {
        let html = convert("See https://example.com/docs. Thanks");
        assert!(html.contains(r#"<a href="https://example.com/docs">https://example.com/docs</a>."#));

        let html = convert("[already](https://example.com)");
        assert_eq!(html.matches("<a ").count(), 1);

        let html = convert("```\nhttps://example.com\n```");
        assert!(!html.contains("<a "));
    }

    #[test]
    fn test_raw_html_passes_through() {
        let html = convert("<div class=\"note\">hi</div>\n");
        assert!(html.contains("<div class=\"note\">hi</div>"));
    }

    #[test]
    fn test_scripts_are_neutralized() {
        let html = convert("<script>alert(1)</script>\n\n[x](javascript:alert(1))");
        assert!(!html.contains("<script"));
        assert!(!html.contains("</script>"));
        assert!(html.contains("&lt;script"));
        assert!(!html.contains("javascript:"));
    }

    #[test]
    fn test_preprocess_headings_and_bullets() {
        assert_eq!(preprocess("#Title"), "# Title");
        assert_eq!(preprocess("###Deep"), "### Deep");
        assert_eq!(preprocess("# Fine"), "# Fine");
        assert_eq!(preprocess("-item"), "- item");
        assert_eq!(preprocess("+item"), "+ item");
        assert_eq!(preprocess("*item"), "* item");
        assert_eq!(preprocess("*emphasis*"), "*emphasis*");
        assert_eq!(preprocess("---"), "---");
        assert_eq!(preprocess("-1 degrees"), "-1 degrees");
    }

    #[test]
    fn test_preprocess_leaves_fences_alone() {
        let body = "```\n#not-a-heading\n-not-a-list\n```\n";
        assert_eq!(preprocess(body), body);
    }

    #[test]
    fn test_preprocess_closes_fence() {
        assert_eq!(preprocess("```rust\nfn main() {}"), "```rust\nfn main() {}\n```\n");

        let html = convert("```\ncode\n\nafter");
        assert!(html.contains("<pre><code>"));
        assert!(html.contains("after"));
    }

    #[test]
    fn test_preprocess_normalizes_line_endings() {
        assert_eq!(preprocess("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_fixed_headings_render() {
        let html = convert("#Title\n\n-item");
        assert!(html.contains("<h1"));
        assert!(html.contains("<li>item</li>"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Multiple   Spaces  "), "multiple-spaces");
        assert_eq!(slugify("snake_case"), "snake-case");
    }
}
