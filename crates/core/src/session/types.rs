//! Types for the session module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::engine::EngineError;
use crate::job::Options;
use crate::validator::{InputFile, ValidationError};

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStep {
    /// Created, engine load not started.
    Idle,
    /// Engine is loading.
    AwaitingEngine,
    /// Engine ready, waiting for a file.
    Ready,
    /// File accepted, options editable.
    Configuring,
    /// A job is running.
    Processing,
    /// Job finished, artifact available.
    Complete,
    /// Last action failed. Terminal unless the error is recoverable.
    Failed,
}

impl SessionStep {
    /// Returns the step as a string (for logs and rendering).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingEngine => "awaiting_engine",
            Self::Ready => "ready",
            Self::Configuring => "configuring",
            Self::Processing => "processing",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    /// Whether `input_file` and `options` are meaningful in this step.
    pub fn holds_input(&self) -> bool {
        matches!(
            self,
            Self::Configuring | Self::Processing | Self::Complete | Self::Failed
        )
    }

    /// Whether `progress_percent` is meaningful in this step.
    pub fn holds_progress(&self) -> bool {
        matches!(self, Self::Processing | Self::Complete)
    }

    /// Whether `output_artifact` is meaningful in this step.
    pub fn holds_artifact(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Whether `error` is meaningful in this step.
    ///
    /// In `Ready` it is the notice left by a rejected file.
    pub fn holds_error(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

impl std::fmt::Display for SessionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a user-facing session error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionErrorKind {
    /// The environment cannot host the engine.
    EngineInit,
    /// The selected file is not a video.
    Validation,
    /// A job was already in flight.
    EngineBusy,
    /// The engine failed or timed out mid-job.
    Execution,
    /// The user cancelled the job.
    Cancelled,
}

/// The single error message a session shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionError {
    pub kind: SessionErrorKind,
    pub message: String,
    /// False when only a full reload can recover.
    pub recoverable: bool,
}

impl SessionError {
    pub fn engine_init() -> Self {
        Self {
            kind: SessionErrorKind::EngineInit,
            message: "The video engine could not be loaded in this environment. Reload to try again."
                .to_string(),
            recoverable: false,
        }
    }

    pub fn validation(err: &ValidationError) -> Self {
        let message = match err {
            ValidationError::NotAVideo { .. } => "Only video files are supported.",
        };
        Self {
            kind: SessionErrorKind::Validation,
            message: message.to_string(),
            recoverable: true,
        }
    }

    pub fn engine_busy() -> Self {
        Self {
            kind: SessionErrorKind::EngineBusy,
            message: "Another video is already being processed.".to_string(),
            recoverable: true,
        }
    }

    pub fn execution() -> Self {
        Self {
            kind: SessionErrorKind::Execution,
            message: "There was an error processing the video.".to_string(),
            recoverable: true,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            kind: SessionErrorKind::Cancelled,
            message: "Processing was cancelled.".to_string(),
            recoverable: true,
        }
    }
}

/// Maps a failed job to the message the session shows.
///
/// Errors that leave the engine unusable end the session for good.
impl From<&EngineError> for SessionError {
    fn from(err: &EngineError) -> Self {
        match err {
            EngineError::Cancelled => Self::cancelled(),
            EngineError::Busy => Self::engine_busy(),
            e if !e.is_recoverable() => Self::engine_init(),
            _ => Self::execution(),
        }
    }
}

/// The one user interaction tracked by the controller.
///
/// Which optional fields carry meaning depends on `step`; see the `holds_*`
/// methods on [`SessionStep`]. The controller clears the others.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub step: SessionStep,
    pub input_file: Option<InputFile>,
    pub options: Options,
    pub progress_percent: u8,
    pub output_artifact: Option<Artifact>,
    pub error: Option<SessionError>,
    /// Job currently owning the session, while processing or complete.
    pub job_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A fresh session at startup.
    pub fn new() -> Self {
        Self {
            step: SessionStep::Idle,
            input_file: None,
            options: Options::default(),
            progress_percent: 0,
            output_artifact: None,
            error: None,
            job_id: None,
            updated_at: Utc::now(),
        }
    }

    /// A session waiting for a file, optionally carrying a notice.
    pub fn ready(notice: Option<SessionError>) -> Self {
        Self {
            step: SessionStep::Ready,
            error: notice,
            ..Self::new()
        }
    }

    /// A failed session. Input and options are kept so the job can be retried.
    pub fn failed(error: SessionError, input_file: Option<InputFile>, options: Options) -> Self {
        Self {
            step: SessionStep::Failed,
            input_file,
            options,
            error: Some(error),
            ..Self::new()
        }
    }

    /// Whether the session can only be left by a reload.
    pub fn is_terminal(&self) -> bool {
        self.step == SessionStep::Failed
            && self.error.as_ref().map(|e| !e.recoverable).unwrap_or(true)
    }

    /// Whether every optional field agrees with the current step.
    pub fn is_consistent(&self) -> bool {
        let step = self.step;
        let optional_fields_ok = (step.holds_input() || self.input_file.is_none())
            && (step.holds_progress() || self.progress_percent == 0)
            && (step.holds_artifact() || self.output_artifact.is_none())
            && (step.holds_error() || self.error.is_none())
            && (matches!(step, SessionStep::Processing | SessionStep::Complete)
                || self.job_id.is_none());

        let required_fields_ok = match step {
            SessionStep::Configuring | SessionStep::Processing => self.input_file.is_some(),
            SessionStep::Complete => {
                self.output_artifact.is_some() && self.progress_percent == 100
            }
            SessionStep::Failed => self.error.is_some(),
            _ => true,
        };

        optional_fields_ok && required_fields_ok
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::ValidationError;
    use std::sync::Arc;

    #[test]
    fn test_new_session_is_idle() {
        let session = Session::new();
        assert_eq!(session.step, SessionStep::Idle);
        assert!(session.is_consistent());
        assert!(!session.is_terminal());
    }

    #[test]
    fn test_ready_with_notice_is_consistent() {
        let err = ValidationError::NotAVideo {
            content_type: "text/plain".to_string(),
        };
        let session = Session::ready(Some(SessionError::validation(&err)));
        assert!(session.is_consistent());
        assert!(session.error.as_ref().unwrap().recoverable);
        assert_eq!(session.error.as_ref().unwrap().message, "Only video files are supported.");
    }

    #[test]
    fn test_failed_sessions() {
        let terminal = Session::failed(SessionError::engine_init(), None, Options::default());
        assert!(terminal.is_terminal());
        assert!(terminal.is_consistent());

        let recoverable = Session::failed(SessionError::execution(), None, Options::default());
        assert!(!recoverable.is_terminal());
    }

    #[test]
    fn test_stale_fields_are_inconsistent() {
        let mut session = Session::ready(None);
        session.progress_percent = 40;
        assert!(!session.is_consistent());

        let mut session = Session::new();
        session.step = SessionStep::Configuring;
        assert!(!session.is_consistent(), "configuring without a file");
    }

    #[test]
    fn test_step_serialization() {
        let json = serde_json::to_string(&SessionStep::AwaitingEngine).unwrap();
        assert_eq!(json, "\"awaiting_engine\"");
        assert_eq!(SessionStep::Processing.to_string(), "processing");
    }

    #[test]
    fn test_session_error_kinds_recoverability() {
        assert!(!SessionError::engine_init().recoverable);
        assert!(SessionError::engine_busy().recoverable);
        assert!(SessionError::execution().recoverable);
        assert!(SessionError::cancelled().recoverable);
    }

    #[test]
    fn test_session_error_from_engine_error() {
        let cancelled = SessionError::from(&EngineError::Cancelled);
        assert_eq!(cancelled.kind, SessionErrorKind::Cancelled);
        assert!(cancelled.recoverable);

        let busy = SessionError::from(&EngineError::Busy);
        assert_eq!(busy.kind, SessionErrorKind::EngineBusy);

        for err in [
            EngineError::exec("exit code 1", None),
            EngineError::Timeout { timeout_secs: 30 },
            EngineError::Io(Arc::new(std::io::Error::other("disk full"))),
        ] {
            let mapped = SessionError::from(&err);
            assert_eq!(mapped.kind, SessionErrorKind::Execution, "{}", err);
            assert!(mapped.recoverable);
        }

        let gone = SessionError::from(&EngineError::Terminated);
        assert_eq!(gone.kind, SessionErrorKind::EngineInit);
        assert!(!gone.recoverable);
    }
}
