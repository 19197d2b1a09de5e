//! Template helpers.
//!
//! Helpers are plain functions over evaluated arguments. A [`HelperSet`]
//! answers for the names it knows and returns `None` for the rest, so sets
//! can be chained: the renderer asks each installed set in order and falls
//! back to [`Builtins`].
//!
//! | Helper                       | Output                                   |
//! |------------------------------|------------------------------------------|
//! | `link_to(text, href[, cls])` | `<a href="href">text</a>`                |
//! | `tag(name[, text][, attrs])` | `<name k="v">text</name>`                |
//! | `post_link(post)`            | link to `/{post.path}` titled by post    |
//! | `archive_link(year, month)`  | link to `/{year}/{month}`, "October 2008"|
//! | `date(d)`                    | `October 10, 2008`                       |
//! | `rfc822(d)`                  | `Fri, 10 Oct 2008 00:00:00 +0000`        |
//! | `month_name(m)`              | `October`                                |
//! | `escape(s)` / `strip_tags(s)`| escaped text / text without tags         |
//! | `urlify(s)`                  | `hello-world`                            |
//! | `join(list[, sep])`          | items joined, `, ` by default            |
//! | `len(x)`                     | length of a list, string or map          |

use crate::utils::{date, slug};
use regex::Regex;
use serde_json::Value;
use std::{fmt::Write, sync::LazyLock};

/// An evaluated template value.
#[derive(Debug, Clone, PartialEq)]
pub enum Val {
    /// Plain data; escaped when output with `<%=`.
    Data(Value),
    /// Markup built by a helper; never escaped again.
    Html(String),
}

impl Val {
    pub fn null() -> Self {
        Self::Data(Value::Null)
    }

    pub fn text(s: impl Into<String>) -> Self {
        Self::Data(Value::String(s.into()))
    }

    /// View as JSON data; markup becomes a string.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Data(v) => v.clone(),
            Self::Html(s) => Value::String(s.clone()),
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Data(v) => Some(v),
            Self::Html(_) => None,
        }
    }

    /// Text form used for output and string arguments.
    pub fn display(&self) -> String {
        match self {
            Self::Html(s) => s.clone(),
            Self::Data(v) => display_value(v),
        }
    }

    /// `nil`, `false`, empty strings and empty lists are false.
    pub fn truthy(&self) -> bool {
        match self {
            Self::Html(s) => !s.is_empty(),
            Self::Data(Value::Null | Value::Bool(false)) => false,
            Self::Data(Value::String(s)) => !s.is_empty(),
            Self::Data(Value::Array(items)) => !items.is_empty(),
            Self::Data(_) => true,
        }
    }

    /// Equality that lets `"10" == 10` hold for scalars.
    pub fn loose_eq(&self, other: &Self) -> bool {
        let (a, b) = (self.to_value(), other.to_value());
        let scalar = |v: &Value| matches!(v, Value::String(_) | Value::Number(_) | Value::Bool(_));
        if scalar(&a) && scalar(&b) {
            return display_value(&a) == display_value(&b);
        }
        a == b
    }
}

pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Escape `&`, `<`, `>`, `"` and `'`.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

pub fn strip_tags(html: &str) -> String {
    static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("static regex"));
    TAG.replace_all(html, "").into_owned()
}

/// A named family of template helpers.
pub trait HelperSet: Send + Sync {
    /// Run helper `name`. `None` when this set has no such helper.
    fn call(&self, name: &str, args: &[Val]) -> Option<Result<Val, String>>;
}

/// Helpers available to every template.
#[derive(Debug, Default, Clone, Copy)]
pub struct Builtins;

impl HelperSet for Builtins {
    fn call(&self, name: &str, args: &[Val]) -> Option<Result<Val, String>> {
        let result = match name {
            "link_to" => link_to(args),
            "tag" => tag(args),
            "post_link" => post_link(args),
            "archive_link" => archive_link(args),
            "date" => date_arg(name, args).map(|d| Val::text(date::long_date(d))),
            "rfc822" => date_arg(name, args).map(|d| Val::text(date::rfc822(d))),
            "month_name" => month_name(args),
            "escape" => arity(name, args, 1).map(|_| Val::Html(escape_html(&args[0].display()))),
            "strip_tags" => arity(name, args, 1).map(|_| Val::Html(strip_tags(&args[0].display()))),
            "urlify" => arity(name, args, 1).map(|_| Val::text(slug::urlify(&args[0].display()))),
            "join" => join(args),
            "len" => arity(name, args, 1).map(|_| len(&args[0])),
            _ => return None,
        };
        Some(result)
    }
}

fn arity(name: &str, args: &[Val], expected: usize) -> Result<(), String> {
    if args.len() != expected {
        return Err(format!("`{name}` takes {expected} argument(s), got {}", args.len()));
    }
    Ok(())
}

fn arity_range(name: &str, args: &[Val], min: usize, max: usize) -> Result<(), String> {
    if args.len() < min || args.len() > max {
        return Err(format!(
            "`{name}` takes {min} to {max} arguments, got {}",
            args.len()
        ));
    }
    Ok(())
}

fn html_text(val: &Val) -> String {
    match val {
        Val::Html(s) => s.clone(),
        Val::Data(v) => escape_html(&display_value(v)),
    }
}

/// `<name k="v">inner</name>`
fn element(name: &str, attrs: &[(String, String)], inner: &str) -> String {
    let mut out = format!("<{name}");
    for (key, value) in attrs {
        let _ = write!(out, " {key}=\"{}\"", escape_html(value));
    }
    let _ = write!(out, ">{inner}</{name}>");
    out
}

fn link_to(args: &[Val]) -> Result<Val, String> {
    arity_range("link_to", args, 2, 3)?;
    let mut attrs = vec![("href".to_owned(), args[1].display())];
    if let Some(class) = args.get(2).filter(|c| c.truthy()) {
        attrs.push(("class".to_owned(), class.display()));
    }
    Ok(Val::Html(element("a", &attrs, &html_text(&args[0]))))
}

fn tag(args: &[Val]) -> Result<Val, String> {
    arity_range("tag", args, 1, 3)?;
    let name = args[0].display();
    if !name.chars().all(|c| c.is_ascii_alphanumeric()) || name.is_empty() {
        return Err(format!("invalid tag name `{name}`"));
    }

    let mut inner = String::new();
    let mut attrs = Vec::new();
    for arg in &args[1..] {
        match arg.as_value() {
            Some(Value::Object(map)) => attrs.extend(
                map.iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| (k.clone(), display_value(v))),
            ),
            _ => inner = html_text(arg),
        }
    }
    Ok(Val::Html(element(&name, &attrs, &inner)))
}

fn post_link(args: &[Val]) -> Result<Val, String> {
    arity("post_link", args, 1)?;
    let post = args[0].to_value();
    let field = |key: &str| post.get(key).map(display_value);
    let path = field("path").ok_or("`post_link` expects a post")?;
    let title = field("title").unwrap_or_else(|| path.clone());
    let attrs = [("href".to_owned(), format!("/{path}"))];
    Ok(Val::Html(element("a", &attrs, &escape_html(&title))))
}

fn archive_link(args: &[Val]) -> Result<Val, String> {
    arity("archive_link", args, 2)?;
    let year = args[0].display();
    let month = month_number(&args[1])?;
    let name = date::month_name(month).ok_or_else(|| format!("invalid month `{month}`"))?;
    let attrs = [("href".to_owned(), format!("/{year}/{month}"))];
    Ok(Val::Html(element("a", &attrs, &format!("{name} {}", escape_html(&year)))))
}

fn month_number(val: &Val) -> Result<u32, String> {
    let text = val.display();
    text.trim()
        .parse()
        .map_err(|_| format!("invalid month `{text}`"))
}

fn month_name(args: &[Val]) -> Result<Val, String> {
    arity("month_name", args, 1)?;
    let month = month_number(&args[0])?;
    date::month_name(month)
        .map(Val::text)
        .ok_or_else(|| format!("invalid month `{month}`"))
}

fn date_arg(name: &str, args: &[Val]) -> Result<chrono::NaiveDate, String> {
    arity(name, args, 1)?;
    let text = args[0].display();
    date::parse_date(&text).ok_or_else(|| format!("`{name}`: invalid date `{text}`"))
}

fn join(args: &[Val]) -> Result<Val, String> {
    arity_range("join", args, 1, 2)?;
    let sep = args.get(1).map_or_else(|| ", ".to_owned(), Val::display);
    let items = match args[0].as_value() {
        Some(Value::Array(items)) => items.iter().map(display_value).collect::<Vec<_>>(),
        Some(Value::Null) => Vec::new(),
        _ => vec![args[0].display()],
    };
    Ok(Val::text(items.join(&sep)))
}

fn len(val: &Val) -> Val {
    let n = match val {
        Val::Html(s) => s.chars().count(),
        Val::Data(Value::Array(items)) => items.len(),
        Val::Data(Value::Object(map)) => map.len(),
        Val::Data(Value::String(s)) => s.chars().count(),
        Val::Data(Value::Null) => 0,
        Val::Data(_) => 1,
    };
    Val::Data(Value::from(n))
}
