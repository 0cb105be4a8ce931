//! Error types for cabin-env.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cabin-env operations.
pub type Result<T> = std::result::Result<T, EnvError>;

/// Errors raised by host and guest actions.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Command exited with a non-zero status
    #[error("`{command}` exited with status {status}: {stderr}")]
    Execution {
        /// Command line that was executed
        command: String,
        /// Exit status, `-1` when killed by a signal or never spawned
        status: i32,
        /// Captured diagnostic output
        stderr: String,
    },

    /// File does not exist
    #[error("not found: {0}")]
    NotFound(PathBuf),

    /// Read, write or persistence failure
    #[error("I/O error ({context}): {source}")]
    Io {
        /// What was being attempted
        context: String,
        /// Underlying failure
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Guest-targeted operation while the guest is not running
    #[error("guest is not running")]
    NotRunning,

    /// Lifecycle operation against a guest that does not exist
    #[error("guest has not been created")]
    NotCreated,

    /// Provisioning or booting the guest failed
    #[error("failed to provision guest: {0}")]
    Provision(String),

    /// Graceful shutdown did not complete
    #[error("failed to shut down guest: {0}")]
    Shutdown(String),

    /// `start` called with a config the running guest cannot honour
    #[error("configuration mismatch: {0}")]
    ConfigMismatch(String),

    /// Invalid input
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed machine-readable output
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EnvError {
    /// Wrap an I/O style failure with a short description of the operation.
    pub fn io(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Io {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Check if this error means the guest was not running.
    pub fn is_not_running(&self) -> bool {
        matches!(self, EnvError::NotRunning)
    }

    /// Check if this error indicates a missing file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EnvError::NotFound(_))
    }

    /// Exit status of a failed command, if this is an execution error.
    pub fn exit_status(&self) -> Option<i32> {
        match self {
            EnvError::Execution { status, .. } => Some(*status),
            _ => None,
        }
    }
}
