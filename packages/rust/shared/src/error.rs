//! Error types for SchoolForge.
//!
//! Library crates use [`SchoolForgeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all SchoolForge operations.
#[derive(Debug, thiserror::Error)]
pub enum SchoolForgeError {
    /// Configuration loading or validation error. Fatal at startup.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/timeout/non-2xx failure after retry exhaustion.
    /// Non-fatal: the source/record combination is skipped.
    #[error("fetch failed for {url}: {cause}")]
    Fetch { url: String, cause: String },

    /// Per-field extraction or coercion failure.
    #[error("extraction error for field '{field}': {message}")]
    Extraction { field: String, message: String },

    /// Malformed schema configuration during merge. Fatal to the record,
    /// not to the batch.
    #[error("reconciliation error: {message}")]
    Reconciliation { message: String },

    /// Record store failure, distinguishable from an empty result set.
    #[error("storage error: {0}")]
    Storage(String),

    /// Token-count collaborator failure. Recovered locally via the
    /// fallback estimator, never surfaced to planner callers.
    #[error("budget estimation error: {0}")]
    Budget(String),

    /// Orchestration consumer failure for one batch.
    #[error("consumer error: {0}")]
    Consumer(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad filter column, invalid URL, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SchoolForgeError>;

impl SchoolForgeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = SchoolForgeError::config("missing db path");
        assert_eq!(err.to_string(), "config error: missing db path");

        let err = SchoolForgeError::Fetch {
            url: "https://example.com/x".into(),
            cause: "connection refused".into(),
        };
        assert!(err.to_string().contains("https://example.com/x"));
        assert!(err.to_string().contains("connection refused"));
    }
}
