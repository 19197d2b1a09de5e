//! Blog configuration management for `blog.toml`.
//!
//! # Sections
//!
//! | Section       | Purpose                                        |
//! |---------------|------------------------------------------------|
//! | `[base]`      | Blog metadata (title, author, url, categories) |
//! | `[content]`   | Content directories, extensions, scan bound    |
//! | `[templates]` | Template directory, layout, staleness mode     |
//! | `[serve]`     | HTTP server (port, interface, refresh timer)   |
//! | `[comments]`  | Comment storage                                |
//! | `[extra]`     | User-defined fields exposed to templates       |
//!
//! # Example
//!
//! ```toml
//! [base]
//! title = "My Blog"
//! url = "https://example.com"
//! categories = ["Ruby", "Javascript"]
//!
//! [content]
//! dirs = ["posts", "pages"]
//!
//! [templates]
//! mode = "production"
//!
//! [serve]
//! port = 5277
//!
//! [extra]
//! analytics_id = "UA-12345"
//! ```

mod base;
mod content;
pub mod defaults;
mod error;
mod handle;
mod serve;
mod templates;

pub use base::BaseConfig;
pub use content::{CommentsConfig, ContentConfig};
pub use error::ConfigError;
pub use handle::{cfg, init_config, reload_config};
pub use serve::ServeConfig;
pub use templates::{TemplateMode, TemplatesConfig};

use crate::cli::{Cli, Commands};
use anyhow::{Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing blog.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// CLI arguments reference
    #[serde(skip)]
    pub cli: Option<&'static Cli>,

    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Basic blog information
    #[serde(default)]
    pub base: BaseConfig,

    /// Content scanning settings
    #[serde(default)]
    pub content: ContentConfig,

    /// Template settings
    #[serde(default)]
    pub templates: TemplatesConfig,

    /// HTTP server settings
    #[serde(default)]
    pub serve: ServeConfig,

    /// Comment settings
    #[serde(default)]
    pub comments: CommentsConfig,

    /// User-defined extra fields
    #[serde(default)]
    pub extra: BTreeMap<String, toml::Value>,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: SiteConfig = toml::from_str(content).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Load, apply CLI overrides and validate.
    ///
    /// Used at startup and by the background refresh.
    pub fn load(cli: &'static Cli) -> Result<Self> {
        let root = cli.root.as_deref().unwrap_or(Path::new("./"));
        let config_path = root.join(&cli.config);

        if !config_path.exists() {
            bail!("Config file not found: {}", config_path.display());
        }

        let mut config = Self::from_path(&config_path)?;
        config.update_with_cli(cli);
        config.validate()?;
        Ok(config)
    }

    /// Get the root directory path
    pub fn get_root(&self) -> &Path {
        self.content.root.as_deref().unwrap_or(Path::new("./"))
    }

    /// Set the root directory path
    pub fn set_root(&mut self, path: &Path) {
        self.content.root = Some(path.to_path_buf())
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &'static Cli) {
        self.cli = Some(cli);

        let root = cli
            .root
            .as_ref()
            .cloned()
            .unwrap_or_else(|| self.get_root().to_owned());
        let root = Self::normalize_path(&root);
        self.config_path = Self::normalize_path(&root.join(&cli.config));
        self.set_root(&root);

        if let Commands::Serve {
            interface,
            port,
            production,
        } = &cli.command
        {
            Self::update_option(&mut self.serve.interface, interface.as_ref());
            Self::update_option(&mut self.serve.port, port.as_ref());
            if *production {
                self.templates.mode = TemplateMode::Production;
            }
            if self.base.url.is_none() {
                self.base.url = Some(format!(
                    "http://{}:{}",
                    self.serve.interface, self.serve.port
                ));
            }
        }
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Normalize a path to absolute, using canonicalize if the path exists
    fn normalize_path(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            }
        })
    }

    /// Validate configuration values that serde cannot check.
    pub fn validate(&self) -> Result<()> {
        if self.content.dirs.is_empty() {
            bail!(ConfigError::Validation(
                "[content.dirs] must have at least one element".into()
            ));
        }

        if self.content.extensions.is_empty() {
            bail!(ConfigError::Validation(
                "[content.extensions] must have at least one element".into()
            ));
        }

        if let Some(ext) = self
            .content
            .extensions
            .iter()
            .find(|ext| ext.is_empty() || ext.contains(['.', '/', '*']))
        {
            bail!(ConfigError::Validation(format!(
                "[content.extensions] contains an invalid extension: `{ext}`"
            )));
        }

        if let Some(base_url) = &self.base.url
            && !base_url.starts_with("http")
        {
            bail!(ConfigError::Validation(
                "[base.url] must start with http:// or https://".into()
            ));
        }

        if self.templates.layout.is_empty() {
            bail!(ConfigError::Validation(
                "[templates.layout] must not be empty".into()
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str() {
        let config = SiteConfig::from_str(
            r#"
            [base]
            title = "Blog"

            [extra]
            analytics_id = "UA-12345"
            "#,
        )
        .unwrap();

        assert_eq!(config.base.title, "Blog");
        assert_eq!(
            config.extra.get("analytics_id").and_then(|v| v.as_str()),
            Some("UA-12345")
        );
    }

    #[test]
    fn test_from_str_invalid_toml() {
        let err = SiteConfig::from_str("[base\ntitle = ").unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn test_get_root_default() {
        let config = SiteConfig::default();
        assert_eq!(config.get_root(), Path::new("./"));
    }

    #[test]
    fn test_set_root() {
        let mut config = SiteConfig::default();
        config.set_root(Path::new("/srv/blog"));
        assert_eq!(config.get_root(), Path::new("/srv/blog"));
    }

    #[test]
    fn test_validate_defaults() {
        let config = SiteConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_extension() {
        let mut config = SiteConfig::default();
        config.content.extensions = vec!["md".into(), "*.html".into()];
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("*.html"));
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = SiteConfig::default();
        config.base.url = Some("example.com".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_dirs() {
        let mut config = SiteConfig::default();
        config.content.dirs.clear();
        assert!(config.validate().is_err());
    }
}
