//! Session lifecycle integration tests.
//!
//! These tests drive the session controller against the mock engine:
//! - Startup and engine initialization outcomes
//! - File selection and validation
//! - The clip.mov to mp4 scenario end to end
//! - Reset, including reset while a job runs
//! - Output format changes after completion (relabel vs new job)
//! - Shutdown

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

use vidpress_core::{
    engine::{EngineError, GatewayConfig, GatewayState},
    job::{CRF_COMPRESSED, CRF_STANDARD},
    testing::{fixtures, MockEngine, DEFAULT_OUTPUT},
    Compression, ControllerError, InputFile, OutputFormat, Resolution, SessionController,
    SessionErrorKind, SessionStep,
};

/// Test helper wiring a controller to a mock engine.
struct TestHarness {
    controller: Arc<SessionController>,
    engine: MockEngine,
    files: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_config(GatewayConfig::default())
    }

    fn with_config(config: GatewayConfig) -> Self {
        let engine = MockEngine::new();
        let controller = fixtures::controller(&engine, config);
        let files = TempDir::new().expect("Failed to create temp dir");
        Self {
            controller,
            engine,
            files,
        }
    }

    async fn started() -> Self {
        let harness = Self::new();
        let step = harness.controller.start().await.expect("start failed");
        assert_eq!(step, SessionStep::Ready);
        harness
    }

    async fn file(&self, name: &str, content_type: &str) -> InputFile {
        fixtures::video_file(self.files.path(), name, content_type)
            .await
            .expect("Failed to create input file")
    }

    /// Selects a file and sets every option.
    async fn configure(
        &self,
        name: &str,
        content_type: &str,
        resolution: Resolution,
        compressed: bool,
        format: OutputFormat,
    ) {
        let file = self.file(name, content_type).await;
        assert_eq!(
            self.controller.select_file(file).await.unwrap(),
            SessionStep::Configuring
        );
        self.controller.set_resolution(resolution).unwrap();
        self.controller
            .set_compression(Compression::from(compressed))
            .unwrap();
        self.controller.set_output_format(format).unwrap();
    }

    async fn wait_for_step(&self, step: SessionStep) {
        let mut rx = self.controller.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.step == step))
            .await
            .expect("Timed out waiting for step")
            .expect("Session channel closed");
    }
}

// =============================================================================
// Startup
// =============================================================================

#[tokio::test]
async fn test_startup_reaches_ready() {
    let harness = TestHarness::new();
    assert_eq!(harness.controller.snapshot().step, SessionStep::Idle);

    let step = assert_ok!(harness.controller.start().await);
    assert_eq!(step, SessionStep::Ready);
    assert_eq!(harness.engine.load_count().await, 1);
    assert_eq!(
        harness.controller.gateway().state().await,
        GatewayState::Ready
    );
}

#[tokio::test]
async fn test_engine_init_failure_is_terminal() {
    let harness = TestHarness::new();
    harness
        .engine
        .set_load_error(EngineError::init("required isolation primitives unavailable"))
        .await;

    let step = assert_ok!(harness.controller.start().await);
    assert_eq!(step, SessionStep::Failed);

    let session = harness.controller.snapshot();
    assert!(session.is_terminal());
    assert!(session.is_consistent());
    let error = session.error.unwrap();
    assert_eq!(error.kind, SessionErrorKind::EngineInit);
    assert!(!error.recoverable);
    assert!(!error.message.contains("isolation"), "engine detail leaked");

    // Only a reload gets out of here
    let file = harness.file("clip.mp4", "video/mp4").await;
    assert_eq!(
        harness.controller.select_file(file).await,
        Err(ControllerError::Terminal)
    );
    assert_eq!(harness.controller.reset().await, Err(ControllerError::Terminal));
    assert_eq!(harness.controller.retry().await, Err(ControllerError::Terminal));
    assert_eq!(harness.engine.load_count().await, 1);
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_non_video_is_rejected_and_session_stays_ready() {
    let harness = TestHarness::started().await;

    let notes = harness.file("notes.txt", "text/plain").await;
    let step = assert_ok!(harness.controller.select_file(notes).await);

    // An earlier design routed this to a terminal failure needing a reload.
    // Here the session never leaves Ready and the notice is recoverable.
    assert_eq!(step, SessionStep::Ready);
    let session = harness.controller.snapshot();
    assert!(session.input_file.is_none());
    let error = session.error.clone().unwrap();
    assert_eq!(error.kind, SessionErrorKind::Validation);
    assert!(error.recoverable);
    assert!(session.is_consistent());

    assert_err!(harness.controller.submit().await);
    assert_eq!(harness.engine.exec_count().await, 0);

    // Picking another file works without a reload
    let clip = harness.file("clip.mp4", "video/mp4").await;
    assert_eq!(
        harness.controller.select_file(clip).await.unwrap(),
        SessionStep::Configuring
    );
    assert!(harness.controller.snapshot().error.is_none());
}

#[tokio::test]
async fn test_rejection_while_configuring_returns_to_ready() {
    let harness = TestHarness::started().await;
    harness
        .configure("clip.mp4", "video/mp4", Resolution::P480, true, OutputFormat::Mp4)
        .await;

    let notes = harness.file("notes.txt", "text/plain").await;
    assert_eq!(
        harness.controller.select_file(notes).await.unwrap(),
        SessionStep::Ready
    );

    let session = harness.controller.snapshot();
    assert!(session.input_file.is_none());
    assert_eq!(session.options.resolution, Resolution::P720);
    assert_eq!(session.options.compression, Compression::Unset);
}

// =============================================================================
// Jobs
// =============================================================================

#[tokio::test]
async fn test_clip_mov_to_compressed_480p_mp4() {
    let harness = TestHarness::started().await;
    harness
        .configure(
            "clip.mov",
            "video/quicktime",
            Resolution::P480,
            true,
            OutputFormat::Mp4,
        )
        .await;

    let step = assert_ok!(harness.controller.submit().await);
    assert_eq!(step, SessionStep::Complete);

    let execs = harness.engine.recorded_execs().await;
    assert_eq!(execs.len(), 1);
    let args = &execs[0];
    assert!(args.contains(&"scale=-2:480".to_string()));
    assert!(args.contains(&CRF_COMPRESSED.to_string()));
    assert!(!args.contains(&CRF_STANDARD.to_string()));
    assert!(args.contains(&"input.mov".to_string()));
    assert_eq!(args.last().map(String::as_str), Some("output.mp4"));

    let session = harness.controller.snapshot();
    assert!(session.is_consistent());
    assert_eq!(session.progress_percent, 100);
    let artifact = session.output_artifact.unwrap();
    assert_eq!(artifact.mime_type, "video/mp4");
    assert_eq!(artifact.default_filename, "video.mp4");
    assert!(artifact.retrieval_handle.starts_with("artifact:"));

    let bytes = harness
        .controller
        .presenter()
        .resolve(&artifact.retrieval_handle)
        .await
        .unwrap();
    assert_eq!(&bytes[..], DEFAULT_OUTPUT);
    assert!(harness.engine.namespace_files().await.is_empty());
}

#[tokio::test]
async fn test_submit_requires_compression_choice() {
    let harness = TestHarness::started().await;
    let file = harness.file("clip.mp4", "video/mp4").await;
    harness.controller.select_file(file).await.unwrap();

    assert_eq!(
        harness.controller.submit().await.unwrap(),
        SessionStep::Configuring
    );
    assert_eq!(harness.engine.exec_count().await, 0);

    harness
        .controller
        .set_compression(Compression::Disabled)
        .unwrap();
    assert_eq!(
        harness.controller.submit().await.unwrap(),
        SessionStep::Complete
    );
    let execs = harness.engine.recorded_execs().await;
    assert!(execs[0].contains(&CRF_STANDARD.to_string()));
}

#[tokio::test]
async fn test_options_are_frozen_outside_configuring() {
    let harness = TestHarness::started().await;
    harness
        .configure("clip.mp4", "video/mp4", Resolution::P360, false, OutputFormat::Mp4)
        .await;
    harness.controller.submit().await.unwrap();

    let err = harness
        .controller
        .set_resolution(Resolution::P720)
        .unwrap_err();
    assert_eq!(
        err,
        ControllerError::InvalidStep {
            step: SessionStep::Complete,
            action: "set the resolution",
        }
    );
}

// =============================================================================
// Reset
// =============================================================================

#[tokio::test]
async fn test_reset_after_completion_revokes_artifact() {
    let harness = TestHarness::started().await;
    harness
        .configure("clip.mp4", "video/mp4", Resolution::P480, true, OutputFormat::Avi)
        .await;
    harness.controller.submit().await.unwrap();
    let handle = harness
        .controller
        .snapshot()
        .output_artifact
        .unwrap()
        .retrieval_handle;

    let step = assert_ok!(harness.controller.reset().await);
    assert_eq!(step, SessionStep::Ready);

    let session = harness.controller.snapshot();
    assert!(session.is_consistent());
    assert!(session.input_file.is_none());
    assert_eq!(session.progress_percent, 0);
    assert_eq!(session.options.resolution, Resolution::P720);
    assert_eq!(session.options.compression, Compression::Unset);
    assert_eq!(harness.controller.presenter().live_handles().await, 0);
    assert_err!(harness.controller.presenter().resolve(&handle).await);
}

#[tokio::test]
async fn test_reset_while_processing_cancels_then_resets() {
    let harness = TestHarness::started().await;
    harness.engine.set_exec_delay(Duration::from_secs(5)).await;
    harness
        .configure("clip.mov", "video/quicktime", Resolution::P480, true, OutputFormat::Mp4)
        .await;

    let controller = Arc::clone(&harness.controller);
    let job = tokio::spawn(async move { controller.submit().await });
    harness.wait_for_step(SessionStep::Processing).await;

    let step = assert_ok!(harness.controller.reset().await);
    assert_eq!(step, SessionStep::Ready);

    // The job ended early and its output never surfaced
    assert_ok!(job.await.unwrap());
    let session = harness.controller.snapshot();
    assert_eq!(session.step, SessionStep::Ready);
    assert!(session.output_artifact.is_none());
    assert!(session.job_id.is_none());
    assert!(session.is_consistent());

    assert!(harness.engine.namespace_files().await.is_empty());
    assert_eq!(harness.controller.presenter().live_handles().await, 0);
    assert_eq!(
        harness.controller.gateway().state().await,
        GatewayState::Ready
    );
}

#[tokio::test]
async fn test_reset_is_rejected_before_engine_is_ready() {
    let harness = TestHarness::new();
    let err = harness.controller.reset().await.unwrap_err();
    assert!(matches!(
        err,
        ControllerError::InvalidStep {
            step: SessionStep::Idle,
            ..
        }
    ));
}

// =============================================================================
// Output format after completion
// =============================================================================

#[tokio::test]
async fn test_format_change_within_family_relabels() {
    let harness = TestHarness::started().await;
    harness
        .configure("clip.mp4", "video/mp4", Resolution::P480, true, OutputFormat::Mp4)
        .await;
    harness.controller.submit().await.unwrap();
    let before = harness.controller.snapshot().output_artifact.unwrap();

    let step = assert_ok!(harness.controller.change_output_format(OutputFormat::Mov).await);
    assert_eq!(step, SessionStep::Complete);
    assert_eq!(harness.engine.exec_count().await, 1, "relabel must not run a job");

    let session = harness.controller.snapshot();
    assert_eq!(session.options.output_format, OutputFormat::Mov);
    let after = session.output_artifact.unwrap();
    assert_eq!(after.mime_type, "video/quicktime");
    assert_eq!(after.default_filename, "video.mov");
    assert_eq!(after.container, OutputFormat::Mp4);
    assert_eq!(after.bytes, before.bytes);
    assert_ne!(after.retrieval_handle, before.retrieval_handle);

    let presenter = harness.controller.presenter();
    assert_err!(presenter.resolve(&before.retrieval_handle).await);
    assert_ok!(presenter.resolve(&after.retrieval_handle).await);
    assert_eq!(presenter.live_handles().await, 1);
}

#[tokio::test]
async fn test_format_change_across_families_runs_new_job() {
    let harness = TestHarness::started().await;
    harness
        .configure("clip.mp4", "video/mp4", Resolution::P360, false, OutputFormat::Mp4)
        .await;
    harness.controller.submit().await.unwrap();
    let first = harness.controller.snapshot().output_artifact.unwrap();

    harness.engine.set_output(b"riff bytes".to_vec()).await;
    let step = assert_ok!(harness.controller.change_output_format(OutputFormat::Avi).await);
    assert_eq!(step, SessionStep::Complete);

    let execs = harness.engine.recorded_execs().await;
    assert_eq!(execs.len(), 2);
    assert_eq!(execs[1].last().map(String::as_str), Some("output.avi"));
    assert!(execs[1].contains(&"scale=-2:360".to_string()));

    let artifact = harness.controller.snapshot().output_artifact.unwrap();
    assert_eq!(artifact.container, OutputFormat::Avi);
    assert_eq!(artifact.mime_type, "video/x-msvideo");
    assert_eq!(&artifact.bytes[..], b"riff bytes");

    let presenter = harness.controller.presenter();
    assert_err!(presenter.resolve(&first.retrieval_handle).await);
    assert_eq!(presenter.live_handles().await, 1);
}

#[tokio::test]
async fn test_format_change_requires_completion() {
    let harness = TestHarness::started().await;
    let err = harness
        .controller
        .change_output_format(OutputFormat::Mov)
        .await
        .unwrap_err();
    assert!(matches!(err, ControllerError::InvalidStep { .. }));
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test]
async fn test_shutdown_releases_everything() {
    let harness = TestHarness::started().await;
    harness
        .configure("clip.mp4", "video/mp4", Resolution::P480, true, OutputFormat::Mp4)
        .await;
    harness.controller.submit().await.unwrap();

    harness.controller.shutdown().await;
    harness.controller.shutdown().await;

    assert_eq!(harness.controller.presenter().live_handles().await, 0);
    assert_eq!(harness.engine.terminate_count().await, 1);
    assert_eq!(
        harness.controller.gateway().state().await,
        GatewayState::Terminated
    );
}
