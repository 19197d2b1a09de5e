//! `[serve]` section configuration.
//!
//! Contains HTTP server settings.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[serve]` section in blog.toml - HTTP server settings.
///
/// # Example
/// ```toml
/// [serve]
/// interface = "0.0.0.0"  # Listen on all interfaces
/// port = 3000
/// refresh_secs = 10      # Re-read blog.toml every 10 seconds (0 disables)
/// public = "static"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct ServeConfig {
    /// Network interface to bind.
    /// - `127.0.0.1` (default): localhost only
    /// - `0.0.0.0`: all interfaces (LAN accessible)
    #[serde(default = "defaults::serve::interface")]
    #[educe(Default = defaults::serve::interface())]
    pub interface: String,

    /// HTTP port number (default: 5277).
    #[serde(default = "defaults::serve::port")]
    #[educe(Default = defaults::serve::port())]
    pub port: u16,

    /// Interval of the background config refresh, in seconds.
    #[serde(default = "defaults::serve::refresh_secs")]
    #[educe(Default = defaults::serve::refresh_secs())]
    pub refresh_secs: u64,

    /// Directory (relative to root) of static files served before routing.
    #[serde(default = "defaults::serve::public")]
    #[educe(Default = defaults::serve::public())]
    pub public: PathBuf,
}
