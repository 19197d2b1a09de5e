//! `[content]` and `[comments]` section configuration.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// `[content]` section in blog.toml - where documents live and how they are scanned.
///
/// # Example
/// ```toml
/// [content]
/// dirs = ["posts", "pages"]
/// extensions = ["md", "html"]
/// reload_timeout_ms = 500
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct ContentConfig {
    /// Project root; all relative paths resolve against it.
    #[serde(default = "defaults::content::root")]
    #[educe(Default = defaults::content::root())]
    pub root: Option<PathBuf>,

    /// Content directories (relative to root), scanned in this order.
    #[serde(default = "defaults::content::dirs")]
    #[educe(Default = defaults::content::dirs())]
    pub dirs: Vec<PathBuf>,

    /// Recognized file extensions. The extension is the document's type tag.
    #[serde(default = "defaults::content::extensions")]
    #[educe(Default = defaults::content::extensions())]
    pub extensions: Vec<String>,

    /// A reload taking longer than this is reported as a fault.
    #[serde(default = "defaults::content::reload_timeout_ms")]
    #[educe(Default = defaults::content::reload_timeout_ms())]
    pub reload_timeout_ms: u64,

    /// Number of posts shown on the index page and in feeds.
    #[serde(default = "defaults::content::recent")]
    #[educe(Default = defaults::content::recent())]
    pub recent: usize,
}

impl ContentConfig {
    pub const fn reload_timeout(&self) -> Duration {
        Duration::from_millis(self.reload_timeout_ms)
    }
}

/// `[comments]` section in blog.toml.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct CommentsConfig {
    /// Accept new comments through `POST /comments`.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub enable: bool,

    /// Directory (relative to root) holding one comment file per post.
    #[serde(default = "defaults::comments::dir")]
    #[educe(Default = defaults::comments::dir())]
    pub dir: PathBuf,
}
