//! Common error types for the Bock health tooling.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`BockError`].
pub type BockResult<T> = Result<T, BockError>;

/// Common errors across the Bock health crates.
#[derive(Error, Diagnostic, Debug)]
pub enum BockError {
    /// Invalid container ID or name format.
    #[error("Invalid container ID: {id}")]
    #[diagnostic(
        code(bock::container::invalid_id),
        help(
            "Container IDs start with a letter or digit and may contain letters, digits, '_', '.' and '-' (max 128 characters)"
        )
    )]
    InvalidContainerId {
        /// The invalid container ID.
        id: String,
    },

    /// A health check configuration was rejected.
    #[error("Invalid health check configuration ({field}): {reason}")]
    #[diagnostic(
        code(bock::health::invalid_config),
        help("Durations must be 0 (use default) or at least 1ms; tests use [\"CMD\", ...], [\"CMD-SHELL\", cmd] or [\"NONE\"]")
    )]
    InvalidHealthConfig {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// The container's health check is disabled.
    #[error("Health check disabled for container {id}")]
    #[diagnostic(code(bock::health::disabled))]
    HealthcheckDisabled {
        /// The container ID.
        id: String,
    },

    /// Running a command inside a container failed before it produced an exit code.
    #[error("Exec failed in container {id}: {message}")]
    #[diagnostic(code(bock::exec))]
    Exec {
        /// The container ID.
        id: String,
        /// The underlying cause.
        message: String,
    },

    /// No async runtime was available to host a monitor task.
    #[error("No async runtime available: {message}")]
    #[diagnostic(
        code(bock::runtime::unavailable),
        help("Monitors must be started from within a tokio runtime")
    )]
    RuntimeUnavailable {
        /// The error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(bock::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(bock::serialization))]
    Serialization(String),
}

impl BockError {
    /// Build an [`BockError::Exec`] for a container.
    pub fn exec(id: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Exec {
            id: id.into(),
            message: message.to_string(),
        }
    }

    /// Build an [`BockError::InvalidHealthConfig`].
    pub fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidHealthConfig {
            field,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for BockError {
    fn from(err: serde_json::Error) -> Self {
        BockError::Serialization(err.to_string())
    }
}
