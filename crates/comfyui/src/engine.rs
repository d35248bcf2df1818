//! The execution engine contract and its ComfyUI implementation.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use trikot_core::Workflow;

use crate::api::{ComfyUIApi, ComfyUIApiError};
use crate::client::ComfyUIClient;
use crate::completion::wait_for_completion;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::outputs::collect_files;
use crate::reconnect::{probe_until_ready, ReconnectConfig};

/// A workflow converted into the prompt document the engine accepts.
#[derive(Debug, Clone)]
pub struct LoadedWorkflow {
    pub prompt: Value,
    pub node_count: usize,
    /// IDs of nodes that write files (`Save*` / `Preview*`).
    pub output_nodes: Vec<String>,
}

/// Result of a completed prompt.
#[derive(Debug, Clone)]
pub struct ExecutionSummary {
    pub prompt_id: String,
    pub cached_nodes: usize,
    pub executed_nodes: usize,
    pub elapsed: Duration,
}

/// What the job processor needs from an execution engine.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Turn a prepared workflow into something executable.
    fn load_workflow(&self, workflow: &Workflow) -> Result<LoadedWorkflow, EngineError>;

    /// Make sure the engine is reachable, waiting for it if needed.
    async fn ensure_connected(&self) -> Result<(), EngineError>;

    /// Run the workflow to completion.
    async fn execute(&self, workflow: &LoadedWorkflow) -> Result<ExecutionSummary, EngineError>;

    /// Files present under `dirs` after execution, in deterministic order.
    async fn collect_outputs(&self, dirs: &[PathBuf]) -> Result<Vec<PathBuf>, EngineError>;
}

/// [`ExecutionEngine`] backed by a ComfyUI server.
pub struct ComfyUIEngine {
    client: ComfyUIClient,
    api: ComfyUIApi,
    backoff: ReconnectConfig,
    connect_timeout: Duration,
    execution_timeout: Duration,
}

impl ComfyUIEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let api = ComfyUIApi::new(config.api_url(), config.request_timeout)
            .map_err(|e| EngineError::Unavailable(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client: ComfyUIClient::new(config.ws_url()),
            api,
            backoff: ReconnectConfig::default(),
            connect_timeout: config.startup_timeout,
            execution_timeout: config.execution_timeout,
        })
    }

    /// Override the backoff used by [`ExecutionEngine::ensure_connected`].
    pub fn with_backoff(mut self, backoff: ReconnectConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn api(&self) -> &ComfyUIApi {
        &self.api
    }

    async fn interrupt_after_timeout(&self, prompt_id: &str) {
        tracing::warn!(
            prompt_id,
            timeout_secs = self.execution_timeout.as_secs(),
            "Execution timed out, interrupting ComfyUI",
        );
        if let Err(e) = self.api.interrupt().await {
            tracing::warn!(prompt_id, error = %e, "Failed to interrupt ComfyUI");
        }
    }
}

#[async_trait]
impl ExecutionEngine for ComfyUIEngine {
    fn load_workflow(&self, workflow: &Workflow) -> Result<LoadedWorkflow, EngineError> {
        if workflow.is_empty() {
            return Err(EngineError::InvalidWorkflow("workflow has no nodes".into()));
        }
        let output_nodes: Vec<String> = workflow
            .nodes()
            .filter(|node| node.is_output())
            .map(|node| node.id.to_string())
            .collect();
        if output_nodes.is_empty() {
            tracing::warn!("Workflow has no Save/Preview node; it may produce no files");
        }
        for (node, link) in workflow.dangling_links() {
            tracing::warn!(
                node,
                input = link.input,
                from_node = %link.from_node,
                "Input is linked to a node missing from the workflow",
            );
        }

        Ok(LoadedWorkflow {
            prompt: workflow.to_value(),
            node_count: workflow.len(),
            output_nodes,
        })
    }

    async fn ensure_connected(&self) -> Result<(), EngineError> {
        probe_until_ready(&self.api, &self.backoff, self.connect_timeout).await?;
        Ok(())
    }

    async fn execute(&self, workflow: &LoadedWorkflow) -> Result<ExecutionSummary, EngineError> {
        let started = Instant::now();

        // Subscribe before submitting so no completion message is missed.
        let mut conn = self
            .client
            .connect()
            .await
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;

        let submitted = self
            .api
            .submit_workflow(&workflow.prompt, &conn.client_id)
            .await
            .map_err(|e| match e {
                ComfyUIApiError::Request(e) => {
                    EngineError::Unavailable(format!("submitting prompt: {e}"))
                }
                ComfyUIApiError::ApiError { status, body } => {
                    EngineError::Execution(format!("ComfyUI rejected the prompt ({status}): {body}"))
                }
            })?;

        tracing::info!(
            prompt_id = %submitted.prompt_id,
            queue_position = submitted.number,
            nodes = workflow.node_count,
            output_nodes = ?workflow.output_nodes,
            "Prompt submitted",
        );
        if submitted.node_errors.as_object().is_some_and(|errors| !errors.is_empty()) {
            tracing::warn!(
                prompt_id = %submitted.prompt_id,
                node_errors = %submitted.node_errors,
                "ComfyUI reported node errors",
            );
        }

        let waited = tokio::time::timeout(
            self.execution_timeout,
            wait_for_completion(&mut conn.ws_stream, &submitted.prompt_id),
        )
        .await;

        let progress = match waited {
            Ok(result) => result?,
            Err(_) => {
                self.interrupt_after_timeout(&submitted.prompt_id).await;
                return Err(EngineError::Execution(format!(
                    "prompt {} did not finish within {}s",
                    submitted.prompt_id,
                    self.execution_timeout.as_secs()
                )));
            }
        };

        Ok(ExecutionSummary {
            prompt_id: submitted.prompt_id,
            cached_nodes: progress.cached_nodes,
            executed_nodes: progress.executed_nodes,
            elapsed: started.elapsed(),
        })
    }

    async fn collect_outputs(&self, dirs: &[PathBuf]) -> Result<Vec<PathBuf>, EngineError> {
        collect_files(dirs).await
    }
}
