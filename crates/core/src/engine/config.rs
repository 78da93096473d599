//! Configuration for the engine and its gateway.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::traits::EngineBinaries;

/// Configuration for the FFmpeg process engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Path to ffprobe binary.
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,

    /// Root under which each engine instance creates its private namespace.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Minimum interval between raw progress events, in milliseconds.
    #[serde(default = "default_progress_interval")]
    pub progress_interval_ms: u64,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("vidpress-engine")
}

fn default_progress_interval() -> u64 {
    250
}

fn default_log_level() -> String {
    "error".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            scratch_dir: default_scratch_dir(),
            progress_interval_ms: default_progress_interval(),
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// Creates a new config with custom ffmpeg/ffprobe paths.
    pub fn with_paths(ffmpeg_path: PathBuf, ffprobe_path: PathBuf) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
            ..Default::default()
        }
    }

    /// Sets the scratch directory.
    pub fn with_scratch_dir(mut self, scratch_dir: PathBuf) -> Self {
        self.scratch_dir = scratch_dir;
        self
    }

    /// The binaries the engine is bootstrapped from.
    pub fn binaries(&self) -> EngineBinaries {
        EngineBinaries {
            core: self.ffmpeg_path.clone(),
            probe: self.ffprobe_path.clone(),
        }
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

/// Configuration for the engine gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Upper bound for a single job in seconds. Unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_timeout_secs: Option<u64>,

    /// Capacity of the raw progress channel between engine and gateway.
    #[serde(default = "default_progress_capacity")]
    pub progress_channel_capacity: usize,
}

fn default_progress_capacity() -> usize {
    64
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            job_timeout_secs: None,
            progress_channel_capacity: default_progress_capacity(),
        }
    }
}

impl GatewayConfig {
    /// Sets the job timeout in seconds.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.job_timeout_secs = Some(timeout_secs);
        self
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_secs.map(Duration::from_secs)
    }
}
