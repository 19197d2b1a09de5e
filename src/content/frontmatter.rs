//! Front matter parsing for content files.
//!
//! A content file may open with a YAML block:
//!
//! ```text
//! ---
//! date: 2008-10-10
//! category: Ruby
//! tags: ruby, rails
//! ---
//!
//! New post
//! ========
//! ```
//!
//! The block starts at a `---` line and ends at a closing `---` line or at
//! the first blank line, whichever comes first. A file that does not start
//! with `---` has no front matter.

use crate::utils::date::parse_date;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use thiserror::Error;

const FENCE: &str = "---";

/// Front matter failures, without file context.
#[derive(Debug, Error, PartialEq)]
pub enum FrontMatterError {
    #[error("invalid YAML: {0}")]
    Yaml(String),

    #[error("invalid date `{0}`")]
    Date(String),

    #[error("field `{0}` must be a string")]
    NotAString(&'static str),
}

/// Parsed front matter of one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    /// Explicit `title:` key; the document may instead take its title from a heading.
    pub title: Option<String>,
    pub date: Option<NaiveDate>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub author: Option<String>,
    /// Every other key, untouched.
    pub extra: BTreeMap<String, Value>,
}

impl Metadata {
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    /// Look up a key outside the typed fields.
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Serialize back to YAML, without fences.
    ///
    /// Returns an empty string when nothing is set.
    pub fn to_yaml(&self) -> String {
        let mut map = Mapping::new();
        let mut put = |key: &str, value: Value| {
            map.insert(Value::String(key.to_owned()), value);
        };

        if let Some(title) = &self.title {
            put("title", Value::String(title.clone()));
        }
        if let Some(date) = self.date {
            put("date", Value::String(date.format("%Y-%m-%d").to_string()));
        }
        if let Some(category) = &self.category {
            put("category", Value::String(category.clone()));
        }
        if !self.tags.is_empty() {
            put("tags", Value::String(self.tags.join(", ")));
        }
        if let Some(author) = &self.author {
            put("author", Value::String(author.clone()));
        }
        for (key, value) in &self.extra {
            put(key, value.clone());
        }

        if map.is_empty() {
            return String::new();
        }
        serde_yaml::to_string(&map).unwrap_or_default()
    }
}

/// Raw shape of the YAML block before validation.
#[derive(Debug, Default, Deserialize)]
struct RawFrontMatter {
    #[serde(default)]
    title: Option<Value>,
    #[serde(default)]
    date: Option<Value>,
    #[serde(default)]
    category: Option<Value>,
    #[serde(default)]
    tags: Option<Value>,
    #[serde(default)]
    author: Option<Value>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

/// Split `source` into `(front matter, body)`.
///
/// Returns `None` when the file does not open with a fence line.
pub fn split(source: &str) -> Option<(&str, &str)> {
    let after_open = source
        .strip_prefix(FENCE)
        .and_then(|rest| rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n")))?;

    let mut offset = 0;
    for line in after_open.split_inclusive('\n') {
        let trimmed = line.trim_end();
        let end = offset + line.len();

        if trimmed == FENCE {
            let body = &after_open[end..];
            let body = body
                .strip_prefix('\n')
                .or_else(|| body.strip_prefix("\r\n"))
                .unwrap_or(body);
            return Some((&after_open[..offset], body));
        }
        if trimmed.is_empty() {
            return Some((&after_open[..offset], &after_open[end..]));
        }
        offset = end;
    }

    Some((after_open, ""))
}

/// Parse the front matter of `source`, returning it with the remaining body.
pub fn parse(source: &str) -> Result<(Metadata, &str), FrontMatterError> {
    let Some((yaml, body)) = split(source) else {
        return Ok((Metadata::default(), source));
    };

    if yaml.trim().is_empty() {
        return Ok((Metadata::default(), body));
    }

    let raw: RawFrontMatter =
        serde_yaml::from_str(yaml).map_err(|err| FrontMatterError::Yaml(err.to_string()))?;

    let date = match raw.date {
        None | Some(Value::Null) => None,
        Some(value) => {
            let text = scalar(&value).ok_or(FrontMatterError::NotAString("date"))?;
            Some(parse_date(&text).ok_or(FrontMatterError::Date(text))?)
        }
    };

    let meta = Metadata {
        title: optional_string(raw.title, "title")?,
        date,
        category: optional_string(raw.category, "category")?,
        tags: tag_list(raw.tags)?,
        author: optional_string(raw.author, "author")?,
        extra: raw.extra,
    };

    Ok((meta, body))
}

/// Render a scalar YAML value as text.
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn optional_string(
    value: Option<Value>,
    field: &'static str,
) -> Result<Option<String>, FrontMatterError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => scalar(&value)
            .map(Some)
            .ok_or(FrontMatterError::NotAString(field)),
    }
}

/// Tags may be a comma-separated string or a YAML list.
fn tag_list(value: Option<Value>) -> Result<Vec<String>, FrontMatterError> {
    let tags = match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|item| scalar(item).ok_or(FrontMatterError::NotAString("tags")))
            .collect::<Result<_, _>>()?,
        Some(value) => scalar(&value)
            .ok_or(FrontMatterError::NotAString("tags"))?
            .split(',')
            .map(str::to_owned)
            .collect(),
    };

    Ok(tags
        .into_iter()
        .map(|tag| tag.trim().to_owned())
        .filter(|tag| !tag.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_closing_fence() {
        let (yaml, body) = split("---\ndate: 2008-10-10\n---\n\nBody text").unwrap();
        assert_eq!(yaml, "date: 2008-10-10\n");
        assert_eq!(body, "Body text");
    }

    #[test]
    fn test_split_blank_line_terminates() {
        let (yaml, body) = split("---\ncategory: Ruby\n\nBody text").unwrap();
        assert_eq!(yaml, "category: Ruby\n");
        assert_eq!(body, "Body text");
    }

    #[test]
    fn test_split_closing_fence_without_blank_line() {
        let (_, body) = split("---\ntitle: x\n---\nBody").unwrap();
        assert_eq!(body, "Body");
    }

    #[test]
    fn test_split_none_without_fence() {
        assert!(split("Just a body").is_none());
        assert!(split("----\nnot a fence").is_none());
    }

    #[test]
    fn test_split_unterminated() {
        let (yaml, body) = split("---\ntitle: x\n").unwrap();
        assert_eq!(yaml, "title: x\n");
        assert_eq!(body, "");
    }

    #[test]
    fn test_parse_fields() {
        let source = "---\ntitle: Hello\ndate: 2008-10-10\ncategory: Ruby\ntags: ruby, rails\nauthor: me\nmood: happy\n---\n\nBody";
        let (meta, body) = parse(source).unwrap();

        assert_eq!(meta.title.as_deref(), Some("Hello"));
        assert_eq!(meta.date, NaiveDate::from_ymd_opt(2008, 10, 10));
        assert_eq!(meta.category.as_deref(), Some("Ruby"));
        assert_eq!(meta.tags, vec!["ruby", "rails"]);
        assert_eq!(meta.author.as_deref(), Some("me"));
        assert_eq!(
            meta.extra("mood").and_then(Value::as_str),
            Some("happy")
        );
        assert_eq!(body, "Body");
    }

    #[test]
    fn test_parse_tag_sequence() {
        let (meta, _) = parse("---\ntags: [ruby, \" rails \"]\n---\n").unwrap();
        assert_eq!(meta.tags, vec!["ruby", "rails"]);
    }

    #[test]
    fn test_parse_numeric_title() {
        let (meta, _) = parse("---\ntitle: 1984\n---\n").unwrap();
        assert_eq!(meta.title.as_deref(), Some("1984"));
    }

    #[test]
    fn test_parse_without_front_matter() {
        let (meta, body) = parse("# Title\n\nBody").unwrap();
        assert_eq!(meta, Metadata::default());
        assert_eq!(body, "# Title\n\nBody");
    }

    #[test]
    fn test_parse_bad_date() {
        let err = parse("---\ndate: someday\n---\n").unwrap_err();
        assert_eq!(err, FrontMatterError::Date("someday".into()));
    }

    #[test]
    fn test_parse_bad_yaml() {
        let err = parse("---\ntitle: [unclosed\n---\n").unwrap_err();
        assert!(matches!(err, FrontMatterError::Yaml(_)));
    }

    #[test]
    fn test_parse_non_scalar_category() {
        let err = parse("---\ncategory: {a: 1}\n---\n").unwrap_err();
        assert_eq!(err, FrontMatterError::NotAString("category"));
    }

    #[test]
    fn test_to_yaml_roundtrip() {
        let source = "---\ndate: 2008-10-10\ncategory: Ruby\ntags: ruby, rails\nmood: happy\n---\n";
        let (meta, _) = parse(source).unwrap();
        let dumped = format!("---\n{}---\n", meta.to_yaml());
        let (reparsed, _) = parse(&dumped).unwrap();
        assert_eq!(reparsed, meta);
    }

    #[test]
    fn test_to_yaml_empty() {
        assert_eq!(Metadata::default().to_yaml(), "");
    }
}
