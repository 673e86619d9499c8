//! Error types for Seoforge.
//!
//! Library crates use [`SeoforgeError`] via `thiserror`.
//! The CLI app wraps this with `color-eyre` for rich diagnostics.
//!
//! Fatal vs. recoverable: `Config` and `Validation` abort the run before any
//! stage executes; `SignalUnavailable` and `Analysis` are per-query failures
//! that exclude one query and are recorded as run degradations.

use std::path::PathBuf;

/// Top-level error type for all Seoforge operations.
#[derive(Debug, thiserror::Error)]
pub enum SeoforgeError {
    /// Configuration loading or validation error (fatal, pipeline-wide).
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to a search or signal provider.
    #[error("network error: {0}")]
    Network(String),

    /// A signal provider failed or timed out for one query (recoverable).
    #[error("signal unavailable for query '{query}': {reason}")]
    SignalUnavailable { query: String, reason: String },

    /// A query handed to the scorer has no collected signal set.
    #[error("no signal set collected for query '{query}'")]
    MissingSignal { query: String },

    /// LLM analysis error (bridge, API, or response parsing) for one query.
    #[error("analysis error: {0}")]
    Analysis(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, malformed artifact, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SeoforgeError>;

impl SeoforgeError {
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

    /// Create a per-query signal failure.
    pub fn signal(query: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SignalUnavailable {
            query: query.into(),
            reason: reason.into(),
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
        let err = SeoforgeError::config("weights do not sum to 1.0");
        assert_eq!(err.to_string(), "config error: weights do not sum to 1.0");

        let err = SeoforgeError::signal("micropipette calibration", "timeout after 20s");
        assert!(err.to_string().contains("micropipette calibration"));
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn missing_signal_names_the_query() {
        let err = SeoforgeError::MissingSignal {
            query: "微量吸管".into(),
        };
        assert!(err.to_string().contains("微量吸管"));
    }
}
