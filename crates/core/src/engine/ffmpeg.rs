//! FFmpeg-based engine implementation.
//!
//! Each loaded instance owns a private scratch directory that plays the role
//! of the engine's file namespace. Jobs run with that directory as their
//! working directory, so the plain names in a job's argument vector resolve
//! inside it.

use async_trait::async_trait;
use regex_lite::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::EngineConfig;
use super::error::EngineError;
use super::traits::{check_file_name, Engine, EngineBinaries};

/// State of a successfully loaded engine.
#[derive(Debug, Clone)]
struct Loaded {
    binaries: EngineBinaries,
    namespace: PathBuf,
}

/// FFmpeg process engine.
pub struct FfmpegEngine {
    config: EngineConfig,
    loaded: RwLock<Option<Loaded>>,
}

impl FfmpegEngine {
    /// Creates a new, unloaded FFmpeg engine.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            loaded: RwLock::new(None),
        }
    }

    /// Creates an engine with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default())
    }

    /// Directory backing the private namespace, once loaded.
    pub async fn namespace_dir(&self) -> Option<PathBuf> {
        self.loaded.read().await.as_ref().map(|l| l.namespace.clone())
    }

    async fn loaded(&self) -> Result<Loaded, EngineError> {
        self.loaded.read().await.clone().ok_or(EngineError::NotReady)
    }

    async fn path_for(&self, name: &str) -> Result<PathBuf, EngineError> {
        check_file_name(name)?;
        Ok(self.loaded().await?.namespace.join(name))
    }

    /// Runs `<binary> -version` to prove the binary is usable.
    async fn check_binary(path: &Path) -> Result<(), EngineError> {
        let output = Command::new(path)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EngineError::init(format!("binary not found at path: {}", path.display()))
                } else {
                    EngineError::init(format!("failed to run {}: {}", path.display(), e))
                }
            })?;

        if !output.status.success() {
            return Err(EngineError::init(format!(
                "{} -version exited with code: {:?}",
                path.display(),
                output.status.code()
            )));
        }
        Ok(())
    }

    /// Global options placed in front of every job's argument vector.
    fn build_command_args(&self, args: &[String]) -> Vec<String> {
        let mut command_args = vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-y".to_string(),
            "-loglevel".to_string(),
            self.config.log_level.clone(),
            "-progress".to_string(),
            "pipe:2".to_string(),
        ];
        command_args.extend(args.iter().cloned());
        command_args
    }

    /// Finds the first `-i` input name in an argument vector.
    fn input_name(args: &[String]) -> Option<&str> {
        args.iter()
            .position(|a| a == "-i")
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    /// Probes the duration of a file in seconds.
    async fn probe_duration(loaded: &Loaded, name: &str) -> Option<f64> {
        let output = Command::new(&loaded.binaries.probe)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(name)
            .current_dir(&loaded.namespace)
            .stdin(Stdio::null())
            .output()
            .await
            .ok()?;

        if !output.status.success() {
            return None;
        }
        Self::parse_probe_duration(&String::from_utf8_lossy(&output.stdout))
    }

    /// Extracts `format.duration` from ffprobe JSON output.
    fn parse_probe_duration(output: &str) -> Option<f64> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: ProbeFormat,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            duration: Option<String>,
        }

        let probe: ProbeOutput = serde_json::from_str(output).ok()?;
        probe
            .format
            .duration
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| *d > 0.0)
    }

    /// Parses an `out_time_ms=` progress line into seconds.
    ///
    /// Despite its name the field carries microseconds.
    fn parse_out_time(re: &Regex, line: &str) -> Option<f64> {
        let caps = re.captures(line)?;
        let micros = caps.get(1)?.as_str().parse::<f64>().ok()?;
        Some(micros / 1_000_000.0)
    }
}

#[async_trait]
impl Engine for FfmpegEngine {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn load(&self, binaries: &EngineBinaries) -> Result<(), EngineError> {
        if self.loaded.read().await.is_some() {
            return Ok(());
        }

        Self::check_binary(&binaries.core).await?;
        Self::check_binary(&binaries.probe).await?;

        let namespace = self.config.scratch_dir.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&namespace).await.map_err(|e| {
            EngineError::init(format!(
                "failed to create engine namespace {}: {}",
                namespace.display(),
                e
            ))
        })?;

        info!(namespace = %namespace.display(), "FFmpeg engine loaded");
        *self.loaded.write().await = Some(Loaded {
            binaries: binaries.clone(),
            namespace,
        });
        Ok(())
    }

    async fn write_file(&self, name: &str, data: Vec<u8>) -> Result<(), EngineError> {
        let path = self.path_for(name).await?;
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    async fn exec(
        &self,
        args: &[String],
        progress_tx: mpsc::Sender<f64>,
    ) -> Result<(), EngineError> {
        let loaded = self.loaded().await?;
        let start = Instant::now();

        // Input duration drives the progress ratio
        let duration_secs = match Self::input_name(args) {
            Some(input) => Self::probe_duration(&loaded, input).await,
            None => None,
        };
        debug!(?duration_secs, "Probed job input");

        let mut child = Command::new(&loaded.binaries.core)
            .args(self.build_command_args(args))
            .current_dir(&loaded.namespace)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::exec("stderr was not captured", None))?;
        let mut reader = BufReader::new(stderr);
        let mut raw_line = Vec::new();

        let time_regex = Regex::new(r"out_time_ms=(\d+)").ok();
        let progress_interval = self.config.progress_interval();
        let mut last_progress_send: Option<Instant> = None;
        let mut error_output = String::new();

        // Metadata echoed on stderr is not guaranteed to be UTF-8
        loop {
            raw_line.clear();
            if reader.read_until(b'\n', &mut raw_line).await? == 0 {
                break;
            }
            let decoded = String::from_utf8_lossy(&raw_line);
            let line = decoded.trim_end();

            if line.contains("Error") || line.contains("error") {
                error_output.push_str(line);
                error_output.push('\n');
            }

            let ratio = if line == "progress=end" {
                Some(1.0)
            } else {
                match (&time_regex, duration_secs) {
                    (Some(re), Some(duration)) => {
                        Self::parse_out_time(re, line).map(|t| t / duration)
                    }
                    _ => None,
                }
            };

            if let Some(ratio) = ratio {
                let due = last_progress_send
                    .map(|t| t.elapsed() >= progress_interval)
                    .unwrap_or(true);
                if due || ratio >= 1.0 {
                    // Non-blocking send
                    let _ = progress_tx.try_send(ratio);
                    last_progress_send = Some(Instant::now());
                }
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(EngineError::exec(
                format!("FFmpeg exited with code: {:?}", status.code()),
                if error_output.is_empty() {
                    None
                } else {
                    Some(error_output)
                },
            ));
        }

        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "FFmpeg exec finished");
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        let path = self.path_for(name).await?;
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::FileNotFound {
                    name: name.to_string(),
                }
            } else {
                e.into()
            }
        })
    }

    async fn delete_file(&self, name: &str) -> Result<(), EngineError> {
        let path = self.path_for(name).await?;
        tokio::fs::remove_file(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::FileNotFound {
                    name: name.to_string(),
                }
            } else {
                e.into()
            }
        })
    }

    async fn terminate(&self) {
        let Some(loaded) = self.loaded.write().await.take() else {
            return;
        };

        match tokio::fs::remove_dir_all(&loaded.namespace).await {
            Ok(()) => info!(namespace = %loaded.namespace.display(), "FFmpeg engine terminated"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                namespace = %loaded.namespace.display(),
                error = %e,
                "Failed to remove engine namespace"
            ),
        }
    }
}
