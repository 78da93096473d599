//! Testing utilities and mock implementations.
//!
//! This module provides a mock of the engine trait so the gateway and the
//! session controller can be exercised without ffmpeg installed.
//!
//! # Example
//!
//! ```rust,ignore
//! use vidpress_core::testing::{fixtures, MockEngine};
//!
//! let engine = MockEngine::new();
//! let controller = fixtures::controller(&engine, GatewayConfig::default());
//!
//! controller.start().await?;
//! let file = fixtures::video_file(dir.path(), "clip.mov", "video/quicktime").await?;
//! controller.select_file(file).await?;
//! ```

mod mock_engine;

pub use mock_engine::{MockEngine, DEFAULT_OUTPUT};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use super::MockEngine;
    use crate::engine::{EngineBinaries, EngineGateway, GatewayConfig};
    use crate::session::SessionController;
    use crate::validator::InputFile;

    /// Bytes written into fixture files.
    pub const FIXTURE_BYTES: &[u8] = b"\x00\x00\x00\x18ftypmp42fixture";

    /// Binary paths that are never executed by the mock engine.
    pub fn binaries() -> EngineBinaries {
        EngineBinaries {
            core: PathBuf::from("ffmpeg"),
            probe: PathBuf::from("ffprobe"),
        }
    }

    /// A gateway around a clone of `engine`.
    pub fn gateway(engine: &MockEngine, config: GatewayConfig) -> Arc<EngineGateway> {
        Arc::new(EngineGateway::new(
            Arc::new(engine.clone()),
            binaries(),
            config,
        ))
    }

    /// A controller whose gateway wraps a clone of `engine`.
    pub fn controller(engine: &MockEngine, config: GatewayConfig) -> Arc<SessionController> {
        Arc::new(SessionController::new(gateway(engine, config)))
    }

    /// Writes a small file into `dir` and describes it with `content_type`.
    pub async fn video_file(
        dir: &Path,
        name: &str,
        content_type: &str,
    ) -> std::io::Result<InputFile> {
        let path = dir.join(name);
        tokio::fs::write(&path, FIXTURE_BYTES).await?;
        InputFile::from_path(&path, content_type).await
    }
}
