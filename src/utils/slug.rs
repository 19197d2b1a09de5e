//! URL slugification.
//!
//! Converts titles, category names and tags to URL-safe path segments.

use deunicode::deunicode;

// ============================================================================
// Slugification
// ============================================================================

/// Convert text to a URL segment.
///
/// Transliterates to ASCII, lowercases, collapses runs of spaces and dashes
/// into a single `-`, then drops everything outside `[-a-z0-9_]`.
///
/// ```text
/// "Hello World"        → "hello-world"
/// "Ruby -- on Rails"   → "ruby-on-rails"
/// "Café Société!"      → "cafe-societe"
/// ```
pub fn urlify(text: &str) -> String {
    let ascii = deunicode(text).to_lowercase();
    let mut out = String::with_capacity(ascii.len());
    let mut in_gap = false;

    for c in ascii.chars() {
        if c == ' ' || c == '-' {
            in_gap = true;
            continue;
        }
        if !(c.is_ascii_alphanumeric() || c == '_') {
            continue;
        }
        if in_gap && !out.is_empty() {
            out.push('-');
        }
        in_gap = false;
        out.push(c);
    }

    out
}

/// Slug used as the file name of a new document.
///
/// Falls back to `untitled` when nothing URL-safe remains.
pub fn file_slug(title: &str) -> String {
    let slug = urlify(title);
    if slug.is_empty() {
        "untitled".to_owned()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urlify_simple() {
        assert_eq!(urlify("Hello World"), "hello-world");
    }

    #[test]
    fn test_urlify_collapses_gaps() {
        assert_eq!(urlify("Ruby -- on   Rails"), "ruby-on-rails");
    }

    #[test]
    fn test_urlify_strips_punctuation() {
        assert_eq!(urlify("What's new? (2008)"), "whats-new-2008");
    }

    #[test]
    fn test_urlify_transliterates() {
        assert_eq!(urlify("Café Société"), "cafe-societe");
    }

    #[test]
    fn test_urlify_keeps_underscore() {
        assert_eq!(urlify("snake_case name"), "snake_case-name");
    }

    #[test]
    fn test_urlify_no_leading_or_trailing_dash() {
        assert_eq!(urlify("  - Javascript -  "), "javascript");
    }

    #[test]
    fn test_file_slug_fallback() {
        assert_eq!(file_slug("!!!"), "untitled");
        assert_eq!(file_slug("New Post"), "new-post");
    }
}
