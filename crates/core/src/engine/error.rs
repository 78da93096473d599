//! Error types for the engine module.

use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the transcoding engine and its gateway.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The host environment cannot run the engine (missing binaries, no scratch space).
    #[error("Engine failed to initialize: {reason}")]
    Init { reason: String },

    /// The engine has not finished a successful initialization.
    #[error("Engine is not ready")]
    NotReady,

    /// A job is already in flight.
    #[error("Engine is busy with another job")]
    Busy,

    /// The engine instance has been released.
    #[error("Engine has been terminated")]
    Terminated,

    /// Name is not a plain file name inside the engine namespace.
    #[error("Invalid engine file name: {name:?}")]
    InvalidName { name: String },

    /// File does not exist in the engine namespace.
    #[error("File not found in engine namespace: {name}")]
    FileNotFound { name: String },

    /// The engine ran but the job failed.
    #[error("Execution failed: {reason}")]
    Exec {
        reason: String,
        stderr: Option<String>,
    },

    /// The job exceeded its time budget.
    #[error("Job timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The job was cancelled by the caller.
    #[error("Job cancelled")]
    Cancelled,

    /// I/O error inside the engine namespace.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl EngineError {
    /// Creates a new initialization error.
    pub fn init(reason: impl Into<String>) -> Self {
        Self::Init {
            reason: reason.into(),
        }
    }

    /// Creates a new execution error with optional stderr output.
    pub fn exec(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::Exec {
            reason: reason.into(),
            stderr,
        }
    }

    /// Whether the session can continue after this error without a reload.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Init { .. } | Self::Terminated)
    }

    /// Whether retrying the same job may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Io(_) | Self::Busy | Self::Cancelled
        )
    }
}
