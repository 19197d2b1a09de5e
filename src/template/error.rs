//! Template error types.

use crate::content::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    /// `origin` is `template:line` of the `include` that asked for it.
    #[error("template `{name}` not found{}", origin.as_deref().map(|o| format!(" (included from {o})")).unwrap_or_default())]
    NotFound {
        name: String,
        origin: Option<String>,
    },

    #[error("{name}:{line}: {message}")]
    Compile {
        name: String,
        line: usize,
        message: String,
    },

    #[error("{name}:{line}: {message}")]
    Render {
        name: String,
        line: usize,
        message: String,
    },

    #[error("cannot read template `{name}`")]
    Io {
        name: String,
        #[source]
        source: StorageError,
    },
}

impl TemplateError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
