//! Trait definitions for the engine module.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::mpsc;

use super::error::EngineError;

/// Runtime artifacts an engine is bootstrapped from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineBinaries {
    /// The transcoder itself.
    pub core: PathBuf,
    /// The companion media prober.
    pub probe: PathBuf,
}

/// An external transcoding engine with a private file namespace.
///
/// Files are addressed by plain names; the engine decides where they live.
/// All methods except `name` may only be used after a successful `load`.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Returns the name of this engine implementation.
    fn name(&self) -> &str;

    /// Bootstraps the engine from its runtime binaries.
    async fn load(&self, binaries: &EngineBinaries) -> Result<(), EngineError>;

    /// Stages bytes into the private namespace under `name`.
    async fn write_file(&self, name: &str, data: Vec<u8>) -> Result<(), EngineError>;

    /// Runs the engine with the given argument vector.
    ///
    /// Raw progress ratios (nominally 0.0 - 1.0, possibly noisy and out of
    /// order) are pushed into `progress_tx` without blocking; values are
    /// dropped when the channel is full.
    async fn exec(
        &self,
        args: &[String],
        progress_tx: mpsc::Sender<f64>,
    ) -> Result<(), EngineError>;

    /// Reads a file back out of the private namespace.
    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError>;

    /// Removes a file from the private namespace.
    async fn delete_file(&self, name: &str) -> Result<(), EngineError>;

    /// Releases the engine instance and its namespace. Idempotent.
    async fn terminate(&self);
}

/// Rejects names that would escape the flat engine namespace.
pub(crate) fn check_file_name(name: &str) -> Result<(), EngineError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');

    if invalid {
        return Err(EngineError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}
