//! Content documents: posts and pages.
//!
//! A document is a post when its front matter carries a date, a page
//! otherwise. Its identity path is derived from the source file:
//!
//! | Source                       | Date         | Identity path          |
//! |------------------------------|--------------|------------------------|
//! | `posts/new-post.md`          | `2008-10-10` | `2008/10/new-post`     |
//! | `pages/about.md`             | none         | `about`                |
//! | `pages/projects/blotter.tt`  | none         | `projects/blotter`     |
//!
//! Months are not zero-padded. HTML and summary are rendered on first use.

use super::{
    error::ContentError,
    frontmatter::{self, Metadata},
    markup::Markup,
};
use chrono::{Datelike, NaiveDate};
use serde_json::{Map, Value, json};
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
    time::SystemTime,
};

/// One parsed content file.
pub struct Document {
    path: String,
    source: PathBuf,
    kind: String,
    title: String,
    /// Title came from a heading in the body rather than a `title:` key.
    heading: bool,
    meta: Metadata,
    body: String,
    mtime: SystemTime,
    markup: Arc<dyn Markup>,
    html: OnceLock<String>,
    summary: OnceLock<String>,
}

impl Document {
    /// Parse a content file.
    ///
    /// `dir` is the content directory `source` lives in; both are relative to
    /// the storage root.
    pub fn parse(
        dir: &Path,
        source: &Path,
        text: &str,
        mtime: SystemTime,
        markup: Arc<dyn Markup>,
    ) -> Result<Self, ContentError> {
        let kind = source
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| ContentError::parse(source, "file has no extension"))?
            .to_owned();
        let name = source
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| ContentError::parse(source, "file name is not valid UTF-8"))?;

        let (meta, rest) =
            frontmatter::parse(text).map_err(|err| ContentError::parse(source, err.to_string()))?;

        let (title, heading, body) = match &meta.title {
            Some(title) => (title.clone(), false, rest),
            None => match markup.split_heading(&kind, rest) {
                Some((title, after)) => (title, true, after),
                None => (name.replace(['-', '_'], " "), false, rest),
            },
        };

        let path = match meta.date {
            Some(date) => format!("{}/{}/{name}", date.year(), date.month()),
            None => page_path(dir, source)?,
        };

        Ok(Self {
            path,
            source: source.to_path_buf(),
            kind,
            title,
            heading,
            meta,
            body: body.trim_start_matches(['\n', '\r']).to_owned(),
            mtime,
            markup,
            html: OnceLock::new(),
            summary: OnceLock::new(),
        })
    }

    /// Identity path, e.g. `2008/10/new-post` or `about`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Source file relative to the storage root.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Document type, i.e. the source file extension.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn meta(&self) -> &Metadata {
        &self.meta
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.meta.date
    }

    pub fn category(&self) -> Option<&str> {
        self.meta.category.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.meta.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.meta.tags.iter().any(|t| t == tag)
    }

    /// Raw body below the front matter and title heading.
    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn mtime(&self) -> SystemTime {
        self.mtime
    }

    pub fn is_post(&self) -> bool {
        self.meta.date.is_some()
    }

    pub fn is_page(&self) -> bool {
        !self.is_post()
    }

    /// Rendered body, computed once.
    pub fn html(&self) -> &str {
        self.html
            .get_or_init(|| self.markup.transform(&self.body, &self.kind))
    }

    /// Rendered first paragraph of the body, computed once.
    pub fn summary(&self) -> &str {
        self.summary.get_or_init(|| {
            let first = self
                .body
                .split("\n\n")
                .map(str::trim)
                .find(|chunk| !chunk.is_empty())
                .unwrap_or_default();
            self.markup.transform(first, &self.kind)
        })
    }

    /// Serialize back to source text: front matter, heading, body.
    pub fn dump(&self) -> String {
        let mut out = String::new();

        let yaml = self.meta.to_yaml();
        if !yaml.is_empty() {
            out.push_str("---\n");
            out.push_str(&yaml);
            out.push_str("---\n\n");
        }
        if self.heading {
            out.push_str(&self.markup.heading(&self.kind, &self.title));
            out.push_str("\n\n");
        }
        out.push_str(&self.body);
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out
    }

    /// Template variables for this document.
    pub fn to_value(&self) -> Value {
        let mut value = json!({
            "path": self.path,
            "source": self.source.to_string_lossy(),
            "kind": self.kind,
            "title": self.title,
            "category": self.meta.category,
            "tags": self.meta.tags,
            "author": self.meta.author,
            "body": self.body,
            "html": self.html(),
            "summary": self.summary(),
            "is_post": self.is_post(),
        });

        if let Some(date) = self.meta.date
            && let Value::Object(map) = &mut value
        {
            map.insert("date".into(), json!(date.format("%Y-%m-%d").to_string()));
            map.insert("year".into(), json!(date.year()));
            map.insert("month".into(), json!(date.month()));
            map.insert("day".into(), json!(date.day()));
        }

        if let Value::Object(map) = &mut value {
            let extra: Map<String, Value> = self
                .meta
                .extra
                .iter()
                .filter_map(|(key, v)| serde_json::to_value(v).ok().map(|v| (key.clone(), v)))
                .filter(|(key, _)| !map.contains_key(key))
                .collect();
            map.extend(extra);
        }

        value
    }
}

/// Identity of an undated document: its path under `dir`, minus extension.
fn page_path(dir: &Path, source: &Path) -> Result<String, ContentError> {
    let relative = source.strip_prefix(dir).unwrap_or(source).with_extension("");
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    if parts.is_empty() {
        return Err(ContentError::parse(source, "empty page path"));
    }
    Ok(parts.join("/"))
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("path", &self.path)
            .field("source", &self.source)
            .field("kind", &self.kind)
            .field("title", &self.title)
            .field("meta", &self.meta)
            .field("mtime", &self.mtime)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.source == other.source
            && self.kind == other.kind
            && self.title == other.title
            && self.heading == other.heading
            && self.meta == other.meta
            && self.body == other.body
            && self.mtime == other.mtime
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::markup::StandardMarkup;
    use std::time::UNIX_EPOCH;

    fn parse(dir: &str, source: &str, text: &str) -> Document {
        Document::parse(
            Path::new(dir),
            Path::new(source),
            text,
            UNIX_EPOCH,
            Arc::new(StandardMarkup),
        )
        .unwrap()
    }

    const POST: &str = "---\ndate: 2008-10-10\ncategory: Ruby\ntags: ruby, rails\n---\n\nNew post\n========\n\nFirst paragraph.\n\nSecond paragraph.\n";

    #[test]
    fn test_post_identity_unpadded_month() {
        let doc = parse("posts", "posts/new-post.md", &POST.replace("10-10", "03-10"));
        assert_eq!(doc.path(), "2008/3/new-post");
        assert!(doc.is_post());
    }

    #[test]
    fn test_post_fields() {
        let doc = parse("posts", "posts/new-post.md", POST);
        assert_eq!(doc.path(), "2008/10/new-post");
        assert_eq!(doc.title(), "New post");
        assert_eq!(doc.kind(), "md");
        assert_eq!(doc.category(), Some("Ruby"));
        assert_eq!(doc.tags(), ["ruby", "rails"]);
        assert!(doc.has_tag("rails"));
        assert_eq!(doc.body(), "First paragraph.\n\nSecond paragraph.\n");
    }

    #[test]
    fn test_html_and_summary() {
        let doc = parse("posts", "posts/new-post.md", POST);
        assert!(doc.html().contains("<p>Second paragraph.</p>"));
        assert_eq!(doc.summary().trim(), "<p>First paragraph.</p>");
    }

    #[test]
    fn test_page_identity() {
        let doc = parse("pages", "pages/projects/blotter.tt", "h1. Blotter\n\nA blog engine.");
        assert_eq!(doc.path(), "projects/blotter");
        assert_eq!(doc.title(), "Blotter");
        assert!(doc.is_page());
    }

    #[test]
    fn test_title_from_front_matter_wins() {
        let doc = parse("pages", "pages/about.md", "---\ntitle: About me\n---\n\n# Heading\n");
        assert_eq!(doc.title(), "About me");
        assert_eq!(doc.body(), "# Heading\n");
    }

    #[test]
    fn test_title_falls_back_to_file_name() {
        let doc = parse("pages", "pages/contact-info.html", "<p>Mail me.</p>");
        assert_eq!(doc.title(), "contact info");
    }

    #[test]
    fn test_parse_error_names_source() {
        let err = Document::parse(
            Path::new("posts"),
            Path::new("posts/bad.md"),
            "---\ndate: soon\n---\n",
            UNIX_EPOCH,
            Arc::new(StandardMarkup),
        )
        .unwrap_err();
        assert_eq!(err.source_path(), Some(&PathBuf::from("posts/bad.md")));
    }

    #[test]
    fn test_dump_roundtrip() {
        let doc = parse("posts", "posts/new-post.md", POST);
        let reparsed = parse("posts", "posts/new-post.md", &doc.dump());
        assert_eq!(reparsed, doc);
    }

    #[test]
    fn test_dump_page_without_front_matter() {
        let doc = parse("pages", "pages/about.html", "<h1>About</h1>\n<p>Hi</p>\n");
        assert_eq!(doc.dump(), "<h1>About</h1>\n\n<p>Hi</p>\n");
    }

    #[test]
    fn test_to_value() {
        let doc = parse(
            "posts",
            "posts/new-post.md",
            &POST.replace("tags:", "mood: calm\ntags:"),
        );
        let value = doc.to_value();
        assert_eq!(value["path"], "2008/10/new-post");
        assert_eq!(value["date"], "2008-10-10");
        assert_eq!(value["year"], 2008);
        assert_eq!(value["month"], 10);
        assert_eq!(value["tags"], json!(["ruby", "rails"]));
        assert_eq!(value["mood"], "calm");
        assert_eq!(value["is_post"], true);
    }
}
