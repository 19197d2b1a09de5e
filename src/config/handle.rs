//! Global config with atomic reload support.
//!
//! Uses `arc-swap` for lock-free reads and atomic config replacement.
//! The background refresh thread replaces the config when `blog.toml`
//! changes; request threads always read a complete config.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    CONFIG (ArcSwap)                         │
//! │                                                             │
//! │  ┌─────────────┐     ┌─────────────┐     ┌─────────────┐    │
//! │  │  Request 1  │     │  Request 2  │     │   Refresh   │    │
//! │  │  (thread)   │     │  (thread)   │     │   (timer)   │    │
//! │  └──────┬──────┘     └──────┬──────┘     └──────┬──────┘    │
//! │         │                   │                   │           │
//! │         ▼                   ▼                   ▼           │
//! │       cfg()              cfg()           reload_config()    │
//! │    (lock-free)         (lock-free)      (atomic replace)    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use super::SiteConfig;
use arc_swap::ArcSwap;
use std::sync::{
    Arc, LazyLock,
    atomic::{AtomicU64, Ordering},
};

/// Global config storage with atomic replacement support.
///
/// Initialized with default config, then replaced with loaded config in main.
pub static CONFIG: LazyLock<ArcSwap<SiteConfig>> =
    LazyLock::new(|| ArcSwap::from_pointee(SiteConfig::default()));

/// Hash of the config file content that produced the current config.
static CONFIG_HASH: AtomicU64 = AtomicU64::new(0);

/// Get current config as `Arc<SiteConfig>`.
///
/// Lock-free read via atomic load. The Arc keeps the config alive even if
/// it is replaced while the caller still uses it.
#[inline]
pub fn cfg() -> Arc<SiteConfig> {
    CONFIG.load_full()
}

/// Compute the change-detection hash of config file content.
fn content_hash(content: &[u8]) -> u64 {
    let hash = blake3::hash(content);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// Replace config atomically if blog.toml changed.
///
/// Returns `true` if config was actually updated, `false` if the content
/// matches the last load.
///
/// # Errors
///
/// Returns error if the file cannot be read or fails to parse; the current
/// config stays in place.
pub fn reload_config() -> anyhow::Result<bool> {
    use std::fs;

    let c = cfg();
    let Some(cli) = c.cli else {
        anyhow::bail!("config was not loaded from the command line");
    };

    let content = fs::read_to_string(&c.config_path)?;
    let new_hash = content_hash(content.as_bytes());
    if new_hash == CONFIG_HASH.load(Ordering::Relaxed) {
        return Ok(false);
    }

    let new_config = SiteConfig::load(cli)?;

    CONFIG.store(Arc::new(new_config));
    CONFIG_HASH.store(new_hash, Ordering::Relaxed);

    Ok(true)
}

/// Initialize global config (called once at startup).
#[inline]
pub fn init_config(config: SiteConfig) {
    use std::fs;

    if let Ok(content) = fs::read_to_string(&config.config_path) {
        CONFIG_HASH.store(content_hash(content.as_bytes()), Ordering::Relaxed);
    }

    CONFIG.store(Arc::new(config));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_stable() {
        assert_eq!(content_hash(b"[base]"), content_hash(b"[base]"));
        assert_ne!(content_hash(b"[base]"), content_hash(b"[serve]"));
    }
}
