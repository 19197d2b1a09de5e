//! Markup rendering by document type.
//!
//! A document's type is its file extension. [`StandardMarkup`] knows three:
//!
//! | Type   | Rendering                          | Heading form              |
//! |--------|------------------------------------|---------------------------|
//! | `md`   | CommonMark via pulldown-cmark      | `# Title` or `Title\n===` |
//! | `html` | passed through unchanged           | `<h1>Title</h1>`          |
//! | `tt`   | a small Textile subset             | `h1. Title`               |
//!
//! Unknown types render as Markdown.

use pulldown_cmark::{Options, Parser, html};
use regex::Regex;
use std::sync::LazyLock;

/// Converts a document body to HTML and knows each type's heading syntax.
pub trait Markup: Send + Sync {
    /// Render `body` of type `kind` to HTML.
    fn transform(&self, body: &str, kind: &str) -> String;

    /// Split a leading title heading off `body`.
    ///
    /// Returns the title text and the remaining body.
    fn split_heading<'a>(&self, kind: &str, body: &'a str) -> Option<(String, &'a str)>;

    /// Heading line for `title`, used when writing a document back out.
    fn heading(&self, kind: &str, title: &str) -> String;
}

/// Built-in Markdown, HTML and Textile support.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardMarkup;

impl Markup for StandardMarkup {
    fn transform(&self, body: &str, kind: &str) -> String {
        match kind {
            "html" | "htm" => body.to_owned(),
            "tt" | "textile" => render_textile(body),
            _ => render_markdown(body),
        }
    }

    fn split_heading<'a>(&self, kind: &str, body: &'a str) -> Option<(String, &'a str)> {
        let body = body.trim_start_matches(['\n', '\r']);
        match kind {
            "html" | "htm" => split_html_heading(body),
            "tt" | "textile" => {
                let (line, rest) = first_line(body);
                let title = line.strip_prefix("h1.")?.trim();
                Some((title.to_owned(), rest))
            }
            _ => split_markdown_heading(body),
        }
    }

    fn heading(&self, kind: &str, title: &str) -> String {
        match kind {
            "html" | "htm" => format!("<h1>{title}</h1>"),
            "tt" | "textile" => format!("h1. {title}"),
            _ => format!("{title}\n{}", "=".repeat(title.chars().count().max(3))),
        }
    }
}

/// Split off the first line, returning `(line, rest)`.
fn first_line(s: &str) -> (&str, &str) {
    match s.find('\n') {
        Some(i) => (s[..i].trim_end_matches('\r'), &s[i + 1..]),
        None => (s, ""),
    }
}

// ============================================================================
// Markdown
// ============================================================================

fn render_markdown(body: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(body, options);
    let mut out = String::with_capacity(body.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

fn split_markdown_heading(body: &str) -> Option<(String, &str)> {
    let (line, rest) = first_line(body);

    if let Some(title) = line.strip_prefix("# ") {
        return Some((title.trim().trim_end_matches('#').trim().to_owned(), rest));
    }

    let (underline, after) = first_line(rest);
    let underline = underline.trim_end();
    let is_setext = !line.trim().is_empty()
        && !underline.is_empty()
        && (underline.chars().all(|c| c == '=') || underline.chars().all(|c| c == '-'));
    is_setext.then(|| (line.trim().to_owned(), after))
}

// ============================================================================
// HTML
// ============================================================================

static H1: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\A\s*<h1[^>]*>(.*?)</h1>[ \t]*\r?\n?").expect("valid heading regex")
});

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

fn split_html_heading(body: &str) -> Option<(String, &str)> {
    let caps = H1.captures(body)?;
    let whole = caps.get(0)?;
    let title = TAG.replace_all(caps.get(1)?.as_str(), "").trim().to_owned();
    Some((title, &body[whole.end()..]))
}

// ============================================================================
// Textile
// ============================================================================

static STRONG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*\n]+)\*").expect("valid strong regex"));
static EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b_([^_\n]+)_\b").expect("valid emphasis regex"));
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"\n]+)":(\S+[^\s.,;:!?)])"#).expect("valid link regex"));

fn textile_inline(text: &str) -> String {
    let text = LINK.replace_all(text, r#"<a href="$2">$1</a>"#);
    let text = STRONG.replace_all(&text, "<strong>$1</strong>");
    EMPHASIS.replace_all(&text, "<em>$1</em>").into_owned()
}

/// Block-level Textile: headings, block quotes, bullet lists and paragraphs.
fn render_textile(body: &str) -> String {
    let mut out = String::new();

    for block in body.split("\n\n").map(str::trim).filter(|b| !b.is_empty()) {
        let heading = block
            .strip_prefix('h')
            .and_then(|rest| rest.split_once(". "))
            .filter(|(level, _)| matches!(*level, "1" | "2" | "3" | "4" | "5" | "6"));

        if let Some((level, text)) = heading {
            out.push_str(&format!("<h{level}>{}</h{level}>\n", textile_inline(text)));
        } else if let Some(text) = block.strip_prefix("bq. ") {
            out.push_str(&format!(
                "<blockquote><p>{}</p></blockquote>\n",
                textile_inline(text)
            ));
        } else if block.lines().all(|line| line.starts_with("* ")) {
            out.push_str("<ul>\n");
            for item in block.lines() {
                out.push_str(&format!("<li>{}</li>\n", textile_inline(&item[2..])));
            }
            out.push_str("</ul>\n");
        } else {
            let text = block.lines().collect::<Vec<_>>().join("<br />\n");
            out.push_str(&format!("<p>{}</p>\n", textile_inline(&text)));
        }
    }

    out
}
