//! Session controller: the state machine driving one transcoding session.

use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::artifact::ArtifactPresenter;
use crate::engine::{EngineError, EngineGateway};
use crate::job::{build_job, Compression, JobDescription, Options, OutputFormat, Resolution};
use crate::metrics::VALIDATION_REJECTIONS;
use crate::validator::{validate, InputFile};

use super::types::{Session, SessionError, SessionStep};

/// Errors returned by controller operations.
///
/// These describe misuse of the controller (an action the current step does
/// not allow). Failures of the work itself are recorded in the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("Cannot {action} while the session is {step}")]
    InvalidStep {
        step: SessionStep,
        action: &'static str,
    },

    #[error("Session failed permanently; reload to start over")]
    Terminal,
}

impl ControllerError {
    fn rejected(session: &Session, action: &'static str) -> Self {
        if session.is_terminal() {
            Self::Terminal
        } else {
            Self::InvalidStep {
                step: session.step,
                action,
            }
        }
    }
}

/// A job that has been accepted and moved the session to `Processing`.
struct PendingJob {
    id: String,
    job: JobDescription,
    input_path: PathBuf,
    format: OutputFormat,
    cancel: CancellationToken,
}

/// Owns the single session and orchestrates validator, job builder, gateway
/// and artifact presenter.
///
/// All operations take `&self`; share the controller behind an `Arc` to
/// cancel or reset from another task while a job runs.
pub struct SessionController {
    gateway: Arc<EngineGateway>,
    presenter: ArtifactPresenter,
    session: watch::Sender<Session>,
    /// Token of the most recently started job.
    cancel: StdMutex<CancellationToken>,
    /// Held for the whole run of a job, including engine cleanup.
    job_lock: Mutex<()>,
}

impl SessionController {
    pub fn new(gateway: Arc<EngineGateway>) -> Self {
        let (session, _) = watch::channel(Session::new());
        Self {
            gateway,
            presenter: ArtifactPresenter::new(),
            session,
            cancel: StdMutex::new(CancellationToken::new()),
            job_lock: Mutex::new(()),
        }
    }

    /// A copy of the current session.
    pub fn snapshot(&self) -> Session {
        self.session.borrow().clone()
    }

    /// Subscribes to session changes. Slow receivers only see the latest state.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    pub fn presenter(&self) -> &ArtifactPresenter {
        &self.presenter
    }

    pub fn gateway(&self) -> &Arc<EngineGateway> {
        &self.gateway
    }

    /// Startup: loads the engine and waits for the outcome.
    ///
    /// `Idle` -> `AwaitingEngine` -> `Ready`, or `Failed` (not recoverable)
    /// when the engine cannot be hosted.
    pub async fn start(&self) -> Result<SessionStep, ControllerError> {
        self.update("start", |session| {
            if session.step != SessionStep::Idle {
                return Err(ControllerError::rejected(session, "start"));
            }
            session.step = SessionStep::AwaitingEngine;
            Ok(true)
        })?;

        let outcome = self.gateway.initialize().await;
        self.update("engine loaded", |session| {
            if session.step != SessionStep::AwaitingEngine {
                return Ok(false);
            }
            *session = match &outcome {
                Ok(()) => Session::ready(None),
                Err(e) => {
                    error!(error = %e, "Engine initialization failed");
                    Session::failed(SessionError::engine_init(), None, Default::default())
                }
            };
            Ok(true)
        })
    }

    /// Offers a file to the session.
    ///
    /// A video moves the session to `Configuring` with the current options
    /// kept. Anything else is rejected and the session returns to `Ready`
    /// with a recoverable notice, so the user can pick another file.
    pub async fn select_file(&self, file: InputFile) -> Result<SessionStep, ControllerError> {
        let accepts = |session: &Session| {
            matches!(session.step, SessionStep::Ready | SessionStep::Configuring)
                || (session.step == SessionStep::Failed && !session.is_terminal())
        };

        {
            let session = self.session.borrow();
            if !accepts(&*session) {
                return Err(ControllerError::rejected(&session, "select a file"));
            }
        }

        let name = file.name.clone();
        let verdict = validate(file);
        if let Err(e) = &verdict {
            VALIDATION_REJECTIONS.inc();
            warn!(file = %name, reason = e.reason(), error = %e, "Rejected input file");
        }

        self.update("select a file", move |session| {
            if !accepts(session) {
                return Err(ControllerError::rejected(session, "select a file"));
            }
            let options = session.options;
            *session = match verdict {
                Ok(valid) => Session {
                    step: SessionStep::Configuring,
                    input_file: Some(valid.into_inner()),
                    options,
                    ..Session::new()
                },
                Err(e) => Session::ready(Some(SessionError::validation(&e))),
            };
            Ok(true)
        })
    }

    pub fn set_resolution(&self, resolution: Resolution) -> Result<SessionStep, ControllerError> {
        self.configure("set the resolution", |options| {
            options.resolution = resolution
        })
    }

    pub fn set_compression(&self, compression: Compression) -> Result<SessionStep, ControllerError> {
        self.configure("set compression", |options| {
            options.compression = compression
        })
    }

    pub fn set_output_format(&self, format: OutputFormat) -> Result<SessionStep, ControllerError> {
        self.configure("set the output format", |options| {
            options.output_format = format
        })
    }

    /// Runs the configured job and returns once it has finished.
    ///
    /// With compression still unset this does nothing and the session stays
    /// in `Configuring`.
    pub async fn submit(&self) -> Result<SessionStep, ControllerError> {
        self.start_job("submit", None, |session| {
            session.step == SessionStep::Configuring
        })
        .await
    }

    /// Re-runs the last job after a recoverable failure, same file and options.
    pub async fn retry(&self) -> Result<SessionStep, ControllerError> {
        self.start_job("retry", None, |session| {
            session.step == SessionStep::Failed && !session.is_terminal()
        })
        .await
    }

    /// Changes the output format of a completed session.
    ///
    /// Within one container family the existing artifact is relabeled, no
    /// new job runs. Otherwise the same input is transcoded again into the
    /// requested container.
    pub async fn change_output_format(
        &self,
        format: OutputFormat,
    ) -> Result<SessionStep, ControllerError> {
        let current = {
            let session = self.session.borrow();
            match (&session.step, &session.output_artifact) {
                (SessionStep::Complete, Some(artifact)) => artifact.clone(),
                _ => return Err(ControllerError::rejected(&session, "change the output format")),
            }
        };

        if current.label == format {
            return Ok(SessionStep::Complete);
        }

        if !current.container.can_relabel_as(format) {
            info!(
                from = %current.container,
                to = %format,
                "Output format needs a new job"
            );
            return self
                .start_job("change the output format", Some(format), |session| {
                    session.step == SessionStep::Complete
                })
                .await;
        }

        let relabeled = match self.presenter.relabel(&current, format).await {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(error = %e, "Could not relabel artifact");
                return Ok(self.session.borrow().step);
            }
        };

        let new_handle = relabeled.retrieval_handle.clone();
        let mut applied = false;
        let result = self.update("change the output format", |session| {
            let still_current = session.step == SessionStep::Complete
                && session
                    .output_artifact
                    .as_ref()
                    .map(|a| a.retrieval_handle == current.retrieval_handle)
                    .unwrap_or(false);
            if !still_current {
                return Ok(false);
            }
            session.options.output_format = format;
            session.output_artifact = Some(relabeled);
            applied = true;
            Ok(true)
        });

        if !applied {
            self.presenter.revoke(&new_handle).await;
        }
        result
    }

    /// Cancels the running job. The session fails with a recoverable error.
    pub async fn cancel(&self) -> Result<SessionStep, ControllerError> {
        let job_id = {
            let session = self.session.borrow();
            if session.step != SessionStep::Processing {
                return Err(ControllerError::rejected(&session, "cancel"));
            }
            session.job_id.clone()
        };

        info!(job_id = ?job_id, "Cancelling job");
        self.cancel_current();
        let _idle = self.job_lock.lock().await;

        self.update("cancel", |session| {
            if session.step != SessionStep::Processing || session.job_id != job_id {
                return Ok(false);
            }
            *session = Session::failed(
                SessionError::cancelled(),
                session.input_file.take(),
                session.options,
            );
            Ok(true)
        })
    }

    /// Starts over: back to `Ready` with default options.
    ///
    /// A running job is cancelled first and its engine files are cleaned up
    /// before the session resets. The artifact handle, if any, is revoked.
    pub async fn reset(&self) -> Result<SessionStep, ControllerError> {
        let resettable = |session: &Session| match session.step {
            SessionStep::Ready
            | SessionStep::Configuring
            | SessionStep::Processing
            | SessionStep::Complete => true,
            SessionStep::Failed => !session.is_terminal(),
            SessionStep::Idle | SessionStep::AwaitingEngine => false,
        };

        let processing = {
            let session = self.session.borrow();
            if !resettable(&*session) {
                return Err(ControllerError::rejected(&session, "reset"));
            }
            session.step == SessionStep::Processing
        };

        if processing {
            info!("Reset requested while processing, cancelling job");
            self.cancel_current();
        }
        let _idle = self.job_lock.lock().await;

        let mut released = None;
        let result = self.update("reset", |session| {
            if !resettable(session) {
                return Err(ControllerError::rejected(session, "reset"));
            }
            released = session.output_artifact.take().map(|a| a.retrieval_handle);
            *session = Session::ready(None);
            Ok(true)
        });

        if let Some(handle) = released {
            self.presenter.revoke(&handle).await;
        }
        result
    }

    /// Teardown: stops any job, revokes the artifact and releases the engine.
    pub async fn shutdown(&self) {
        self.cancel_current();
        let _idle = self.job_lock.lock().await;

        let handle = self
            .session
            .borrow()
            .output_artifact
            .as_ref()
            .map(|a| a.retrieval_handle.clone());
        if let Some(handle) = handle {
            self.presenter.revoke(&handle).await;
        }

        self.gateway.terminate().await;
        info!("Session controller shut down");
    }

    fn configure(
        &self,
        action: &'static str,
        apply: impl FnOnce(&mut Options),
    ) -> Result<SessionStep, ControllerError> {
        self.update(action, |session| {
            if session.step != SessionStep::Configuring {
                return Err(ControllerError::rejected(session, action));
            }
            let before = session.options;
            apply(&mut session.options);
            Ok(session.options != before)
        })
    }

    /// Moves the session to `Processing` and runs the job to the end.
    async fn start_job(
        &self,
        action: &'static str,
        format: Option<OutputFormat>,
        allowed: impl Fn(&Session) -> bool,
    ) -> Result<SessionStep, ControllerError> {
        let cancel = CancellationToken::new();
        let id = Uuid::new_v4().to_string();

        let mut pending = None;
        let mut superseded = None;
        let step = self.update(action, |session| {
            if !allowed(session) {
                return Err(ControllerError::rejected(session, action));
            }
            let Some(file) = session.input_file.clone() else {
                return Err(ControllerError::rejected(session, action));
            };

            let mut options = session.options;
            if let Some(format) = format {
                options.output_format = format;
            }
            let job = match build_job(&file.name, &options) {
                Ok(job) => job,
                Err(e) => {
                    debug!(error = %e, "Job not started");
                    return Ok(false);
                }
            };

            superseded = session.output_artifact.take().map(|a| a.retrieval_handle);
            pending = Some(PendingJob {
                id: id.clone(),
                job,
                input_path: file.path.clone(),
                format: options.output_format,
                cancel: cancel.clone(),
            });
            // Swapped while the transition is held so a cancel that sees
            // `Processing` reaches this job's token.
            *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = cancel.clone();
            *session = Session {
                step: SessionStep::Processing,
                input_file: Some(file),
                options,
                job_id: Some(id.clone()),
                ..Session::new()
            };
            Ok(true)
        })?;

        if let Some(handle) = superseded {
            self.presenter.revoke(&handle).await;
        }

        match pending {
            Some(pending) => self.run(pending).await,
            None => Ok(step),
        }
    }

    async fn run(&self, pending: PendingJob) -> Result<SessionStep, ControllerError> {
        let _running = self.job_lock.lock().await;

        if pending.cancel.is_cancelled() || !self.owns(&pending.id) {
            debug!(job_id = %pending.id, "Job superseded before it started");
            return Ok(self.session.borrow().step);
        }

        info!(job_id = %pending.id, args = ?pending.job.args(), "Starting job");
        let started = Instant::now();

        let outcome = match tokio::fs::read(&pending.input_path).await {
            Ok(input) => self.execute(&pending, input).await,
            Err(e) => {
                error!(
                    job_id = %pending.id,
                    path = %pending.input_path.display(),
                    error = %e,
                    "Failed to read input file"
                );
                Err(EngineError::from(e))
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(bytes) => {
                let artifact = self.presenter.present(bytes, pending.format).await;
                let handle = artifact.retrieval_handle.clone();
                let mut applied = false;
                let result = self.update("job finished", |session| {
                    if !Self::is_running(session, &pending.id) {
                        return Ok(false);
                    }
                    session.step = SessionStep::Complete;
                    session.progress_percent = 100;
                    session.output_artifact = Some(artifact);
                    applied = true;
                    Ok(true)
                });
                if applied {
                    info!(job_id = %pending.id, elapsed_ms, "Job complete");
                } else {
                    debug!(job_id = %pending.id, "Discarding output of superseded job");
                    self.presenter.revoke(&handle).await;
                }
                result
            }
            Err(e) => {
                let error = SessionError::from(&e);
                if matches!(e, EngineError::Cancelled) {
                    info!(job_id = %pending.id, elapsed_ms, "Job cancelled");
                } else {
                    error!(
                        job_id = %pending.id,
                        elapsed_ms,
                        retryable = e.is_retryable(),
                        error = %e,
                        "Job failed"
                    );
                }

                self.update("job failed", |session| {
                    if !Self::is_running(session, &pending.id) {
                        return Ok(false);
                    }
                    *session = Session::failed(error, session.input_file.take(), session.options);
                    Ok(true)
                })
            }
        }
    }

    /// Submits to the gateway while mirroring its progress into the session.
    async fn execute(&self, pending: &PendingJob, input: Vec<u8>) -> Result<Vec<u8>, EngineError> {
        let (progress_tx, mut progress_rx) = watch::channel(0u8);

        let relay = async {
            while progress_rx.changed().await.is_ok() {
                let percent = *progress_rx.borrow_and_update();
                self.session.send_if_modified(|session| {
                    if Self::is_running(session, &pending.id) && percent > session.progress_percent
                    {
                        session.progress_percent = percent;
                        session.touch();
                        true
                    } else {
                        false
                    }
                });
            }
        };

        let submit = self.gateway.submit(
            &pending.job,
            input,
            progress_tx,
            pending.cancel.clone(),
        );
        let (result, ()) = tokio::join!(submit, relay);
        result
    }

    fn cancel_current(&self) {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    fn is_running(session: &Session, job_id: &str) -> bool {
        session.step == SessionStep::Processing && session.job_id.as_deref() == Some(job_id)
    }

    fn owns(&self, job_id: &str) -> bool {
        Self::is_running(&self.session.borrow(), job_id)
    }

    /// Applies `change` atomically and notifies subscribers when it reports a
    /// modification. Returns the resulting step.
    fn update<F>(&self, action: &'static str, change: F) -> Result<SessionStep, ControllerError>
    where
        F: FnOnce(&mut Session) -> Result<bool, ControllerError>,
    {
        let mut outcome = Ok(SessionStep::Idle);
        self.session.send_if_modified(|session| {
            let from = session.step;
            match change(session) {
                Ok(modified) => {
                    if modified {
                        session.touch();
                        if from != session.step {
                            info!(from = %from, to = %session.step, action, "Session transition");
                        }
                    }
                    outcome = Ok(session.step);
                    modified
                }
                Err(e) => {
                    outcome = Err(e);
                    false
                }
            }
        });
        outcome
    }
}
