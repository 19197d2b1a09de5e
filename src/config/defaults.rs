//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

// ============================================================================
// Common Defaults
// ============================================================================

pub fn r#true() -> bool {
    true
}

// ============================================================================
// [base] Section Defaults
// ============================================================================

pub mod base {
    pub fn url() -> Option<String> {
        None
    }

    pub fn author() -> String {
        "<YOUR_NAME>".into()
    }

    pub fn language() -> String {
        "en".into()
    }
}

// ============================================================================
// [content] Section Defaults
// ============================================================================

pub mod content {
    use std::path::PathBuf;

    pub fn root() -> Option<PathBuf> {
        None
    }

    pub fn dirs() -> Vec<PathBuf> {
        vec!["posts".into(), "pages".into()]
    }

    pub fn extensions() -> Vec<String> {
        vec!["md".into(), "html".into(), "tt".into()]
    }

    pub fn reload_timeout_ms() -> u64 {
        2000
    }

    pub fn recent() -> usize {
        20
    }
}

// ============================================================================
// [templates] Section Defaults
// ============================================================================

pub mod templates {
    use std::path::PathBuf;

    pub fn dir() -> PathBuf {
        "templates".into()
    }

    pub fn layout() -> String {
        "layout.html".into()
    }
}

// ============================================================================
// [serve] Section Defaults
// ============================================================================

pub mod serve {
    pub fn interface() -> String {
        "127.0.0.1".into()
    }

    pub fn port() -> u16 {
        5277
    }

    pub fn refresh_secs() -> u64 {
        5
    }

    pub fn public() -> std::path::PathBuf {
        "public".into()
    }
}

// ============================================================================
// [comments] Section Defaults
// ============================================================================

pub mod comments {
    use std::path::PathBuf;

    pub fn dir() -> PathBuf {
        "comments".into()
    }
}
