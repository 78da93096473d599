//! Types for the artifact module.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::job::OutputFormat;

/// Prefix of every retrieval handle.
pub const HANDLE_PREFIX: &str = "artifact:";

/// The downloadable output of a completed job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifact {
    /// Output bytes. Shared with the presenter's store.
    #[serde(skip)]
    pub bytes: Arc<[u8]>,
    /// Size of `bytes`.
    pub size_bytes: u64,
    /// MIME type of the current label.
    pub mime_type: String,
    /// Suggested download name.
    pub default_filename: String,
    /// Revocable reference the presentation layer downloads through.
    pub retrieval_handle: String,
    /// Container the engine actually produced.
    pub container: OutputFormat,
    /// Container the artifact is currently offered as.
    pub label: OutputFormat,
    pub created_at: DateTime<Utc>,
}

/// Errors from the artifact presenter.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Handle was never issued or has been revoked.
    #[error("Unknown or revoked artifact handle: {handle}")]
    UnknownHandle { handle: String },

    /// The produced container cannot be offered under the requested label.
    #[error("Cannot relabel {from} output as {to}")]
    IncompatibleLabel {
        from: OutputFormat,
        to: OutputFormat,
    },

    /// Writing the artifact to disk failed.
    #[error("Failed to save artifact to {path}: {source}")]
    SaveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
