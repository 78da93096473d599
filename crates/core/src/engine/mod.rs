//! Engine module: the external transcoding engine and the gateway that owns it.
//!
//! The [`Engine`] trait is the narrow surface the rest of the crate depends
//! on: load, a private file namespace (`write_file` / `read_file` /
//! `delete_file`), `exec` with raw progress, and `terminate`.
//! [`FfmpegEngine`] implements it on top of the `ffmpeg` and `ffprobe`
//! binaries.
//!
//! [`EngineGateway`] wraps one engine instance for the lifetime of the
//! process. It memoizes initialization, enforces the single-job rule,
//! normalizes progress into monotonic percentages, applies cancellation and
//! timeouts, and guarantees that staged files are removed before a job
//! returns.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use vidpress_core::engine::{EngineConfig, EngineGateway, FfmpegEngine, GatewayConfig};
//!
//! let config = EngineConfig::default();
//! let engine = Arc::new(FfmpegEngine::new(config.clone()));
//! let gateway = EngineGateway::new(engine, config.binaries(), GatewayConfig::default());
//!
//! gateway.initialize().await?;
//!
//! let (progress_tx, progress_rx) = tokio::sync::watch::channel(0u8);
//! let cancel = CancellationToken::new();
//! let output = gateway.submit(&job, input_bytes, progress_tx, cancel.clone()).await?;
//! ```

mod config;
mod error;
mod ffmpeg;
mod gateway;
mod traits;

pub use config::{EngineConfig, GatewayConfig};
pub use error::EngineError;
pub use ffmpeg::FfmpegEngine;
pub use gateway::{ratio_to_percent, EngineGateway, GatewayState};
pub use traits::{Engine, EngineBinaries};

pub(crate) use traits::check_file_name;
