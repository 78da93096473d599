//! Mock transcoding engine for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

use crate::engine::{check_file_name, Engine, EngineBinaries, EngineError};

/// Bytes a job "produces" unless [`MockEngine::set_output`] says otherwise.
pub const DEFAULT_OUTPUT: &[u8] = b"mock transcoded output";

/// Mock implementation of the Engine trait.
///
/// Provides controllable behavior for testing:
/// - In-memory file namespace, inspectable for cleanup assertions
/// - Scripted raw progress ratios, noisy values included
/// - Injectable load, exec and read failures
/// - Simulated exec duration
/// - Recorded argument vectors
///
/// Clones share state, so a test can keep one handle while the gateway owns
/// another.
///
/// # Example
///
/// ```rust,ignore
/// use vidpress_core::testing::MockEngine;
///
/// let engine = MockEngine::new();
/// engine.set_progress_script(vec![0.2, 0.1, 0.9]).await;
/// engine.set_exec_delay(Duration::from_millis(50)).await;
///
/// let gateway = EngineGateway::new(Arc::new(engine.clone()), binaries, GatewayConfig::default());
///
/// // ... run a job ...
///
/// assert_eq!(engine.exec_count().await, 1);
/// assert!(engine.namespace_files().await.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct MockEngine {
    /// Files in the private namespace.
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    /// Whether a load succeeded and terminate has not run since.
    loaded: Arc<RwLock<bool>>,
    /// Number of load calls.
    loads: Arc<RwLock<usize>>,
    /// Number of terminate calls.
    terminations: Arc<RwLock<usize>>,
    /// Argument vectors of every exec call.
    execs: Arc<RwLock<Vec<Vec<String>>>>,
    /// If set, load fails with this error.
    load_error: Arc<RwLock<Option<EngineError>>>,
    /// If set, every exec fails with this error.
    exec_error: Arc<RwLock<Option<EngineError>>>,
    /// If set, every read fails with this error.
    read_error: Arc<RwLock<Option<EngineError>>>,
    /// Raw ratios emitted during exec.
    progress_script: Arc<RwLock<Vec<f64>>>,
    /// Simulated exec duration, spread across the progress script.
    exec_delay: Arc<RwLock<Duration>>,
    /// Bytes written to the output name on success.
    output: Arc<RwLock<Vec<u8>>>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// Create a new mock engine.
    pub fn new() -> Self {
        Self {
            files: Arc::new(RwLock::new(HashMap::new())),
            loaded: Arc::new(RwLock::new(false)),
            loads: Arc::new(RwLock::new(0)),
            terminations: Arc::new(RwLock::new(0)),
            execs: Arc::new(RwLock::new(Vec::new())),
            load_error: Arc::new(RwLock::new(None)),
            exec_error: Arc::new(RwLock::new(None)),
            read_error: Arc::new(RwLock::new(None)),
            progress_script: Arc::new(RwLock::new(vec![0.25, 0.5, 0.75, 1.0])),
            exec_delay: Arc::new(RwLock::new(Duration::ZERO)),
            output: Arc::new(RwLock::new(DEFAULT_OUTPUT.to_vec())),
        }
    }

    /// Get the number of load calls.
    pub async fn load_count(&self) -> usize {
        *self.loads.read().await
    }

    /// Get the number of exec calls.
    pub async fn exec_count(&self) -> usize {
        self.execs.read().await.len()
    }

    /// Get the number of terminate calls.
    pub async fn terminate_count(&self) -> usize {
        *self.terminations.read().await
    }

    /// Get the argument vectors of all exec calls.
    pub async fn recorded_execs(&self) -> Vec<Vec<String>> {
        self.execs.read().await.clone()
    }

    /// Names currently present in the namespace, sorted.
    pub async fn namespace_files(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Configure load to fail with the given error.
    pub async fn set_load_error(&self, error: EngineError) {
        *self.load_error.write().await = Some(error);
    }

    /// Configure every exec to fail with the given error.
    pub async fn set_exec_error(&self, error: EngineError) {
        *self.exec_error.write().await = Some(error);
    }

    /// Let exec succeed again.
    pub async fn clear_exec_error(&self) {
        *self.exec_error.write().await = None;
    }

    /// Configure every output read to fail with the given error.
    pub async fn set_read_error(&self, error: EngineError) {
        *self.read_error.write().await = Some(error);
    }

    /// Set the raw ratios emitted during exec, in order.
    pub async fn set_progress_script(&self, ratios: Vec<f64>) {
        *self.progress_script.write().await = ratios;
    }

    /// Set the simulated exec duration.
    pub async fn set_exec_delay(&self, delay: Duration) {
        *self.exec_delay.write().await = delay;
    }

    /// Set the bytes a successful exec produces.
    pub async fn set_output(&self, bytes: Vec<u8>) {
        *self.output.write().await = bytes;
    }

    async fn ensure_loaded(&self) -> Result<(), EngineError> {
        if *self.loaded.read().await {
            Ok(())
        } else {
            Err(EngineError::NotReady)
        }
    }

    /// The name following `-i` in an argument vector.
    fn input_arg(args: &[String]) -> Option<&str> {
        args.iter()
            .position(|a| a == "-i")
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }
}

#[async_trait]
impl Engine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn load(&self, _binaries: &EngineBinaries) -> Result<(), EngineError> {
        *self.loads.write().await += 1;
        if let Some(error) = self.load_error.read().await.clone() {
            return Err(error);
        }
        *self.loaded.write().await = true;
        Ok(())
    }

    async fn write_file(&self, name: &str, data: Vec<u8>) -> Result<(), EngineError> {
        self.ensure_loaded().await?;
        check_file_name(name)?;
        self.files.write().await.insert(name.to_string(), data);
        Ok(())
    }

    async fn exec(
        &self,
        args: &[String],
        progress_tx: mpsc::Sender<f64>,
    ) -> Result<(), EngineError> {
        self.ensure_loaded().await?;
        self.execs.write().await.push(args.to_vec());

        if let Some(error) = self.exec_error.read().await.clone() {
            return Err(error);
        }

        if let Some(input) = Self::input_arg(args) {
            if !self.files.read().await.contains_key(input) {
                return Err(EngineError::exec(
                    format!("{}: No such file or directory", input),
                    None,
                ));
            }
        }

        let script = self.progress_script.read().await.clone();
        let delay = *self.exec_delay.read().await;
        if script.is_empty() {
            tokio::time::sleep(delay).await;
        } else {
            let step = delay / script.len() as u32;
            for ratio in script {
                tokio::time::sleep(step).await;
                // A full channel drops the value, as a real engine would.
                let _ = progress_tx.try_send(ratio);
            }
        }

        let output_name = args
            .last()
            .ok_or_else(|| EngineError::exec("No output file specified", None))?;
        check_file_name(output_name)?;
        let output = self.output.read().await.clone();
        self.files.write().await.insert(output_name.clone(), output);
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        self.ensure_loaded().await?;
        if let Some(error) = self.read_error.read().await.clone() {
            return Err(error);
        }
        self.files
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::FileNotFound {
                name: name.to_string(),
            })
    }

    async fn delete_file(&self, name: &str) -> Result<(), EngineError> {
        self.ensure_loaded().await?;
        self.files
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::FileNotFound {
                name: name.to_string(),
            })
    }

    async fn terminate(&self) {
        *self.terminations.write().await += 1;
        *self.loaded.write().await = false;
        self.files.write().await.clear();
    }
}
