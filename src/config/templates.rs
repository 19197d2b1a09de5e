//! `[templates]` section configuration.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How the template cache treats edited template sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateMode {
    /// Recompile whenever the source modification time changes (default)
    #[default]
    Development,
    /// Compile once and trust the cache for the process lifetime
    Production,
}

/// `[templates]` section in blog.toml.
///
/// # Example
/// ```toml
/// [templates]
/// dir = "templates"
/// layout = "layout.html"
/// mode = "production"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct TemplatesConfig {
    /// Template directory (relative to root).
    #[serde(default = "defaults::templates::dir")]
    #[educe(Default = defaults::templates::dir())]
    pub dir: PathBuf,

    /// Template every full page is wrapped in.
    #[serde(default = "defaults::templates::layout")]
    #[educe(Default = defaults::templates::layout())]
    pub layout: String,

    /// Staleness policy.
    #[serde(default)]
    pub mode: TemplateMode,
}

#[cfg(test)]
mod tests {
    use super::super::SiteConfig;
    use super::TemplateMode;

    #[test]
    fn test_templates_config_defaults() {
        let config: SiteConfig = toml::from_str("[base]\ntitle = \"T\"").unwrap();

        assert_eq!(config.templates.dir.to_str(), Some("templates"));
        assert_eq!(config.templates.layout, "layout.html");
        assert_eq!(config.templates.mode, TemplateMode::Development);
    }

    #[test]
    fn test_template_mode_parsing() {
        let config = r#"
            [base]
            title = "T"
            [templates]
            mode = "production"
        "#;
        let config: SiteConfig = toml::from_str(config).unwrap();
        assert_eq!(config.templates.mode, TemplateMode::Production);

        let config = r#"
            [base]
            title = "T"
            [templates]
            mode = "staging"
        "#;
        assert!(toml::from_str::<SiteConfig>(config).is_err());
    }
}
