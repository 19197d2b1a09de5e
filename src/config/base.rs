//! `[base]` section configuration.
//!
//! Contains basic blog information like title, author, description, etc.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[base]` section in blog.toml - basic blog metadata.
///
/// # Example
/// ```toml
/// [base]
/// title = "Field Notes"
/// description = "Notes on code and tools"
/// author = "Jo Writer"
/// url = "https://notes.example.com"
/// categories = ["Ruby", "Emacs"]
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct BaseConfig {
    /// Blog title displayed in headers and feeds.
    pub title: String,

    /// Default author, used when a post has no `author` key.
    #[serde(default = "defaults::base::author")]
    #[educe(Default = defaults::base::author())]
    pub author: String,

    /// Blog description for feeds and meta tags.
    #[serde(default)]
    pub description: String,

    /// Public URL, used for absolute links in feeds.
    #[serde(default = "defaults::base::url")]
    #[educe(Default = defaults::base::url())]
    pub url: Option<String>,

    /// Language code (e.g., "en", "de").
    #[serde(default = "defaults::base::language")]
    #[educe(Default = defaults::base::language())]
    pub language: String,

    /// Categories shown in navigation, in display order.
    ///
    /// Categories used by posts but missing here are still indexed.
    #[serde(default)]
    pub categories: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::super::SiteConfig;

    #[test]
    fn test_base_config_full() {
        let config = r#"
            [base]
            title = "Field Notes"
            description = "Notes on code and tools"
            url = "https://notes.example.com"
            language = "de"
            categories = ["Ruby", "Emacs"]
        "#;
        let config: SiteConfig = toml::from_str(config).unwrap();

        assert_eq!(config.base.title, "Field Notes");
        assert_eq!(config.base.url.as_deref(), Some("https://notes.example.com"));
        assert_eq!(config.base.language, "de");
        assert_eq!(config.base.categories, vec!["Ruby", "Emacs"]);
    }

    #[test]
    fn test_base_config_defaults() {
        let config = r#"
            [base]
            title = "Test"
        "#;
        let config: SiteConfig = toml::from_str(config).unwrap();

        assert_eq!(config.base.author, "<YOUR_NAME>");
        assert_eq!(config.base.language, "en");
        assert_eq!(config.base.url, None);
        assert!(config.base.categories.is_empty());
    }

    #[test]
    fn test_unknown_field_rejection() {
        let config = r#"
            [base]
            title = "Test"
            copyright = "not a blog field"
        "#;
        let result: Result<SiteConfig, _> = toml::from_str(config);

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("unknown field"));
    }
}
