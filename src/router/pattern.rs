//! Route pattern compilation.
//!
//! # Syntax
//!
//! | Pattern piece | Matches                      | Parameter name       |
//! |---------------|------------------------------|----------------------|
//! | `:name`       | `[-_.a-zA-Z0-9]*`            | `name`               |
//! | `*name`       | anything, including `/`      | `name`               |
//! | `( regex )`   | the raw regex                | its 1-based position |
//! | `\x`          | literal `x`                  |                      |
//! | anything else | itself, literally            |                      |
//!
//! Every pattern compiles to a regex and to a positional template used for
//! URL generation:
//!
//! ```text
//! /(\d+)/(\d+)/:slug   →   ^/(?P<p0>\d+)/(?P<p1>\d+)/(?P<p2>[-_.a-zA-Z0-9]*)$
//!                      →   /{}/{}/{}            params: ["1", "2", "slug"]
//! ```

use super::{Params, RouterError};
use regex::Regex;
use std::fmt;

/// How far the regex is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Whole path must match (endpoints).
    Full,
    /// Only a prefix must match (mounts).
    Prefix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot,
}

/// A compiled route pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
    params: Vec<String>,
    segments: Vec<Segment>,
}

const NAMED_CLASS: &str = "[-_.a-zA-Z0-9]*";

fn group_name(i: usize) -> String {
    format!("p{i}")
}

fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl Pattern {
    pub fn compile(source: &str, anchor: Anchor) -> Result<Self, RouterError> {
        let invalid = |reason: String| RouterError::InvalidPattern {
            pattern: source.to_owned(),
            reason,
        };

        let mut regex = String::from("^");
        let mut params = Vec::new();
        let mut segments = Vec::new();
        let mut literal = String::new();

        let chars: Vec<char> = source.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            match c {
                ':' | '*' if chars.get(i + 1).is_some_and(|&n| is_ident(n)) => {
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && is_ident(chars[end]) {
                        end += 1;
                    }
                    let name: String = chars[start..end].iter().collect();
                    let body = if c == ':' { NAMED_CLASS } else { ".*" };
                    push_slot(&mut regex, &mut params, &mut segments, &mut literal, name, body);
                    i = end;
                }
                '(' => {
                    let (body, end) = raw_group(&chars, i).map_err(invalid)?;
                    let name = (params.len() + 1).to_string();
                    push_slot(&mut regex, &mut params, &mut segments, &mut literal, name, &body);
                    i = end;
                }
                ')' => return Err(invalid(format!("unbalanced `)` at {i}"))),
                '\\' => {
                    let next = *chars
                        .get(i + 1)
                        .ok_or_else(|| invalid("trailing `\\`".into()))?;
                    regex.push_str(&regex::escape(&next.to_string()));
                    literal.push(next);
                    i += 2;
                }
                _ => {
                    regex.push_str(&regex::escape(&c.to_string()));
                    literal.push(c);
                    i += 1;
                }
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        if anchor == Anchor::Full {
            regex.push('$');
        }

        let regex = Regex::new(&regex).map_err(|err| invalid(err.to_string()))?;
        Ok(Self {
            source: source.to_owned(),
            regex,
            params,
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parameter names in capture order.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Positional template with `{}` for each parameter, e.g. `/{}/{}/{}`.
    pub fn template(&self) -> String {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Literal(text) => text.as_str(),
                Segment::Slot => "{}",
            })
            .collect()
    }

    /// Match `path`, returning captured parameters and the end of the match.
    ///
    /// Captured values are cut at their first `.`.
    pub fn captures(&self, path: &str) -> Option<(Params, usize)> {
        let caps = self.regex.captures(path)?;
        let end = caps.get(0)?.end();

        let mut params = Params::default();
        for (i, name) in self.params.iter().enumerate() {
            let value = caps.name(&group_name(i)).map_or("", |m| m.as_str());
            let value = value.split('.').next().unwrap_or_default();
            params.push(name.clone(), value.to_owned());
        }
        Some((params, end))
    }

    /// Substitute `args` in order into the template.
    pub fn fill<S: AsRef<str>>(&self, name: &str, args: &[S]) -> Result<String, RouterError> {
        if args.len() != self.params.len() {
            return Err(RouterError::Arity {
                name: name.to_owned(),
                expected: self.params.len(),
                got: args.len(),
            });
        }

        let mut args = args.iter();
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot => {
                    if let Some(arg) = args.next() {
                        out.push_str(arg.as_ref());
                    }
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Append a capture group for parameter `name`, flushing pending literal text.
fn push_slot(
    regex: &mut String,
    params: &mut Vec<String>,
    segments: &mut Vec<Segment>,
    literal: &mut String,
    name: String,
    body: &str,
) {
    regex.push_str(&format!("(?P<{}>{body})", group_name(params.len())));
    params.push(name);
    if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(literal)));
    }
    segments.push(Segment::Slot);
}

/// Read a parenthesized raw group starting at `open`.
///
/// Returns the inner regex and the index after the closing `)`. Nested
/// groups, escapes and character classes are skipped over.
fn raw_group(chars: &[char], open: usize) -> Result<(String, usize), String> {
    let mut depth = 0usize;
    let mut in_class = false;
    let mut i = open;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                i += 2;
                continue;
            }
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '(' if !in_class => depth += 1,
            ')' if !in_class => {
                depth -= 1;
                if depth == 0 {
                    let body: String = chars[open + 1..i].iter().collect();
                    if body.is_empty() {
                        return Err(format!("empty group at {open}"));
                    }
                    return Ok((body, i + 1));
                }
            }
            _ => {}
        }
        i += 1;
    }

    Err(format!("unclosed `(` at {open}"))
}
