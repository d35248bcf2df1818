//! Fake collaborators shared by the worker integration tests.
//!
//! Every fake appends to one shared call log so tests can assert both
//! which collaborators were touched and in what order.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use trikot_cloud::{Locator, Transfer, TransferError};
use trikot_comfyui::outputs::collect_files;
use trikot_comfyui::{EngineError, ExecutionEngine, ExecutionSummary, LoadedWorkflow};
use trikot_core::{JobError, PrepareOptions, Workflow};
use trikot_worker::{JobProcessor, LocalWorkspace, WorkspaceManager};

// ---------------------------------------------------------------------------
// Call log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Reset,
    Fetch {
        source: String,
        scheme: String,
        dest: PathBuf,
    },
    Publish {
        src: PathBuf,
        destination: String,
    },
    Load,
    EnsureConnected,
    Execute,
    Collect,
}

#[derive(Clone, Default)]
pub struct Calls(Arc<Mutex<Vec<Call>>>);

impl Calls {
    pub fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn all(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.all().iter().filter(|c| pred(c)).count()
    }

    pub fn position(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.all().iter().position(pred)
    }

    pub fn publishes(&self) -> Vec<(PathBuf, String)> {
        self.all()
            .into_iter()
            .filter_map(|c| match c {
                Call::Publish { src, destination } => Some((src, destination)),
                _ => None,
            })
            .collect()
    }

    pub fn fetches(&self) -> Vec<(String, String, PathBuf)> {
        self.all()
            .into_iter()
            .filter_map(|c| match c {
                Call::Fetch {
                    source,
                    scheme,
                    dest,
                } => Some((source, scheme, dest)),
                _ => None,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Engine that "renders" by writing `render_<n>.png` into `output_dir`.
pub struct FakeEngine {
    calls: Calls,
    output_dir: PathBuf,
    runs: AtomicUsize,
    pub write_output: AtomicBool,
    pub unavailable: AtomicBool,
    pub execute_error: Mutex<Option<String>>,
    pub last_prompt: Mutex<Option<Value>>,
    /// Cancelled from inside `execute`, as a signal arriving mid-job would.
    pub cancel_during_execute: Mutex<Option<CancellationToken>>,
}

impl FakeEngine {
    pub fn new(calls: Calls, output_dir: PathBuf) -> Self {
        Self {
            calls,
            output_dir,
            runs: AtomicUsize::new(0),
            write_output: AtomicBool::new(true),
            unavailable: AtomicBool::new(false),
            execute_error: Mutex::new(None),
            last_prompt: Mutex::new(None),
            cancel_during_execute: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ExecutionEngine for FakeEngine {
    fn load_workflow(&self, workflow: &Workflow) -> Result<LoadedWorkflow, EngineError> {
        self.calls.push(Call::Load);
        let prompt = workflow.to_value();
        *self.last_prompt.lock().unwrap() = Some(prompt.clone());
        Ok(LoadedWorkflow {
            prompt,
            node_count: workflow.len(),
            output_nodes: workflow
                .nodes()
                .filter(|n| n.is_output())
                .map(|n| n.id.to_string())
                .collect(),
        })
    }

    async fn ensure_connected(&self) -> Result<(), EngineError> {
        self.calls.push(Call::EnsureConnected);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EngineError::Unavailable("connection refused".into()));
        }
        Ok(())
    }

    async fn execute(&self, _workflow: &LoadedWorkflow) -> Result<ExecutionSummary, EngineError> {
        self.calls.push(Call::Execute);
        let cancel = self.cancel_during_execute.lock().unwrap().clone();
        if let Some(token) = cancel {
            token.cancel();
            tokio::task::yield_now().await;
        }
        let error = self.execute_error.lock().unwrap().clone();
        if let Some(message) = error {
            return Err(EngineError::Execution(message));
        }
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        if self.write_output.load(Ordering::SeqCst) {
            std::fs::write(self.output_dir.join(format!("render_{run}.png")), b"png")
                .map_err(|source| EngineError::Io {
                    path: self.output_dir.clone(),
                    source,
                })?;
        }
        Ok(ExecutionSummary {
            prompt_id: format!("prompt-{run}"),
            cached_nodes: 0,
            executed_nodes: 1,
            elapsed: Duration::from_millis(1),
        })
    }

    async fn collect_outputs(&self, dirs: &[PathBuf]) -> Result<Vec<PathBuf>, EngineError> {
        self.calls.push(Call::Collect);
        collect_files(dirs).await
    }
}

// ---------------------------------------------------------------------------
// Transfer
// ---------------------------------------------------------------------------

/// Transfer that dispatches on the real locator parser but never touches
/// the network. Fetches write the configured payload (or a placeholder).
pub struct FakeTransfer {
    calls: Calls,
    pub payloads: Mutex<HashMap<String, Vec<u8>>>,
    /// Number of upcoming publishes that fail.
    pub failing_publishes: AtomicUsize,
}

impl FakeTransfer {
    pub fn new(calls: Calls) -> Self {
        Self {
            calls,
            payloads: Mutex::new(HashMap::new()),
            failing_publishes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Transfer for FakeTransfer {
    async fn fetch(&self, source: &str, dest: &Path) -> Result<(), TransferError> {
        let locator = Locator::parse(source)?;
        self.calls.push(Call::Fetch {
            source: source.to_string(),
            scheme: locator.scheme().to_string(),
            dest: dest.to_path_buf(),
        });

        let payload = self
            .payloads
            .lock()
            .unwrap()
            .get(source)
            .cloned()
            .unwrap_or_else(|| b"fake-bytes".to_vec());
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(dest, payload).unwrap();
        Ok(())
    }

    async fn publish(&self, src: &Path, destination: &str) -> Result<(), TransferError> {
        self.calls.push(Call::Publish {
            src: src.to_path_buf(),
            destination: destination.to_string(),
        });
        let failing = self.failing_publishes.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_publishes.store(failing - 1, Ordering::SeqCst);
            return Err(TransferError::HttpStatus {
                status: 503,
                url: destination.to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

/// Real [`LocalWorkspace`] that also records each reset.
pub struct RecordingWorkspace {
    calls: Calls,
    inner: LocalWorkspace,
}

#[async_trait]
impl WorkspaceManager for RecordingWorkspace {
    async fn reset(&self) -> Result<(), JobError> {
        self.calls.push(Call::Reset);
        self.inner.reset().await
    }

    fn input_dir(&self) -> &Path {
        self.inner.input_dir()
    }

    fn search_dirs(&self) -> Vec<PathBuf> {
        self.inner.search_dirs()
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub tmp: TempDir,
    pub calls: Calls,
    pub engine: Arc<FakeEngine>,
    pub transfer: Arc<FakeTransfer>,
    pub processor: JobProcessor,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(PrepareOptions::default())
    }

    pub fn with_options(options: PrepareOptions) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let calls = Calls::default();
        let engine = Arc::new(FakeEngine::new(calls.clone(), tmp.path().join("out")));
        let transfer = Arc::new(FakeTransfer::new(calls.clone()));
        let workspace = Arc::new(RecordingWorkspace {
            calls: calls.clone(),
            inner: LocalWorkspace::new(
                tmp.path().join("in"),
                tmp.path().join("out"),
                tmp.path().join("temp"),
            ),
        });
        let processor = JobProcessor::new(engine.clone(), transfer.clone(), workspace, options);

        Self {
            tmp,
            calls,
            engine,
            transfer,
            processor,
        }
    }

    pub fn input_dir(&self) -> PathBuf {
        self.tmp.path().join("in")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.tmp.path().join("out")
    }
}

/// Minimal valid job body with a single output node.
pub fn job_body(destination: &str) -> String {
    serde_json::json!({
        "workflow": {"1": {"class_type": "Save", "inputs": {}}},
        "s3_url": destination,
    })
    .to_string()
}
