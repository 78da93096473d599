//! Engine gateway: the single owner of the transcoding engine instance.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch, Mutex, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::job::JobDescription;
use crate::metrics::{ENGINE_INIT_TOTAL, JOBS_TOTAL, JOB_DURATION};

use super::config::GatewayConfig;
use super::error::EngineError;
use super::traits::{Engine, EngineBinaries};

/// Lifecycle state of the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayState {
    Uninitialized,
    Initializing,
    Ready,
    Busy,
    Terminated,
}

/// Converts a raw engine ratio into a whole percentage in 0..=100.
pub fn ratio_to_percent(ratio: f64) -> u8 {
    if ratio.is_nan() {
        return 0;
    }
    (ratio.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// Mediates every interaction with the engine.
///
/// The gateway runs at most one job at a time and never queues: a `submit`
/// while busy fails immediately with [`EngineError::Busy`]. Files a job
/// stages in the engine namespace are removed before `submit` returns, on
/// every path.
pub struct EngineGateway {
    engine: Arc<dyn Engine>,
    binaries: EngineBinaries,
    config: GatewayConfig,
    init: OnceCell<Result<(), EngineError>>,
    state: Mutex<GatewayState>,
}

impl EngineGateway {
    pub fn new(engine: Arc<dyn Engine>, binaries: EngineBinaries, config: GatewayConfig) -> Self {
        Self {
            engine,
            binaries,
            config,
            init: OnceCell::new(),
            state: Mutex::new(GatewayState::Uninitialized),
        }
    }

    pub async fn state(&self) -> GatewayState {
        *self.state.lock().await
    }

    /// Bootstraps the engine.
    ///
    /// Runs the engine's load sequence once per gateway. Concurrent and later
    /// callers get the cached outcome. A failure is terminal and is never
    /// retried.
    pub async fn initialize(&self) -> Result<(), EngineError> {
        self.init
            .get_or_init(|| async {
                self.set_state_unless_terminated(GatewayState::Initializing)
                    .await;
                info!(engine = self.engine.name(), "Loading transcoding engine");

                let started = Instant::now();
                let result = self.engine.load(&self.binaries).await;
                match &result {
                    Ok(()) => {
                        ENGINE_INIT_TOTAL.with_label_values(&["success"]).inc();
                        info!(
                            engine = self.engine.name(),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Transcoding engine ready"
                        );
                        self.set_state_unless_terminated(GatewayState::Ready).await;
                    }
                    Err(e) => {
                        ENGINE_INIT_TOTAL.with_label_values(&["failed"]).inc();
                        error!(engine = self.engine.name(), error = %e, "Transcoding engine failed to load");
                        self.set_state_unless_terminated(GatewayState::Uninitialized)
                            .await;
                    }
                }
                result
            })
            .await
            .clone()
    }

    /// Runs one job to completion and returns the bytes of its output file.
    ///
    /// `input` is staged under the job's input name. Percentages forwarded on
    /// `progress` never decrease, and reach 100 only on success. The `watch`
    /// channel keeps only the latest value for slow observers.
    pub async fn submit(
        &self,
        job: &JobDescription,
        input: Vec<u8>,
        progress: watch::Sender<u8>,
        cancel: CancellationToken,
    ) -> Result<Vec<u8>, EngineError> {
        {
            let mut state = self.state.lock().await;
            match *state {
                GatewayState::Ready => *state = GatewayState::Busy,
                GatewayState::Busy => {
                    JOBS_TOTAL.with_label_values(&["busy"]).inc();
                    warn!(input = job.input_ref(), "Rejected job: engine busy");
                    return Err(EngineError::Busy);
                }
                GatewayState::Terminated => return Err(EngineError::Terminated),
                GatewayState::Uninitialized | GatewayState::Initializing => {
                    return Err(EngineError::NotReady)
                }
            }
        }

        let started = Instant::now();
        debug!(args = ?job.args(), "Submitting job to engine");

        let result = self.run_job(job, input, &progress, &cancel).await;
        self.cleanup(job).await;

        {
            let mut state = self.state.lock().await;
            if *state == GatewayState::Busy {
                *state = GatewayState::Ready;
            }
        }

        let label = match &result {
            Ok(_) => "success",
            Err(EngineError::Cancelled) => "cancelled",
            Err(EngineError::Timeout { .. }) => "timeout",
            Err(_) => "failed",
        };
        JOBS_TOTAL.with_label_values(&[label]).inc();
        JOB_DURATION
            .with_label_values(&[label])
            .observe(started.elapsed().as_secs_f64());

        result
    }

    /// Releases the engine. Idempotent.
    pub async fn terminate(&self) {
        {
            let mut state = self.state.lock().await;
            if *state == GatewayState::Terminated {
                return;
            }
            *state = GatewayState::Terminated;
        }
        self.engine.terminate().await;
        info!(engine = self.engine.name(), "Transcoding engine terminated");
    }

    async fn set_state_unless_terminated(&self, next: GatewayState) {
        let mut state = self.state.lock().await;
        if *state != GatewayState::Terminated {
            *state = next;
        }
    }

    async fn run_job(
        &self,
        job: &JobDescription,
        input: Vec<u8>,
        progress: &watch::Sender<u8>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, EngineError> {
        let work = async {
            self.engine.write_file(job.input_ref(), input).await?;
            self.exec_with_progress(job, progress).await?;
            self.engine.read_file(job.output_ref()).await
        };

        let bounded = async {
            match self.config.job_timeout() {
                Some(limit) => tokio::time::timeout(limit, work)
                    .await
                    .map_err(|_| EngineError::Timeout {
                        timeout_secs: limit.as_secs(),
                    })?,
                None => work.await,
            }
        };

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            result = bounded => result,
        }?;

        progress.send_if_modified(|current| {
            if *current < 100 {
                *current = 100;
                true
            } else {
                false
            }
        });
        Ok(output)
    }

    /// Runs the engine while relaying its raw progress as monotonic percentages.
    async fn exec_with_progress(
        &self,
        job: &JobDescription,
        progress: &watch::Sender<u8>,
    ) -> Result<(), EngineError> {
        let (raw_tx, mut raw_rx) = mpsc::channel(self.config.progress_channel_capacity.max(1));

        let exec = self.engine.exec(job.args(), raw_tx);
        let relay = async {
            while let Some(ratio) = raw_rx.recv().await {
                // 100 is reserved for a fully read-back output
                let percent = ratio_to_percent(ratio).min(99);
                progress.send_if_modified(|current| {
                    if percent > *current {
                        *current = percent;
                        true
                    } else {
                        false
                    }
                });
            }
        };

        let (result, ()) = tokio::join!(exec, relay);
        result
    }

    /// Removes the job's staged files. Failures are logged, never returned.
    async fn cleanup(&self, job: &JobDescription) {
        for name in [job.input_ref(), job.output_ref()] {
            match self.engine.delete_file(name).await {
                Ok(()) => debug!(file = name, "Removed staged file"),
                Err(EngineError::FileNotFound { .. }) => {
                    debug!(file = name, "Staged file was never created")
                }
                Err(e) => warn!(file = name, error = %e, "Failed to remove staged file"),
            }
        }
    }
}
