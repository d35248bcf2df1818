//! Job processor: one attempt of one job, from raw body to [`Outcome`].
//!
//! The attempt walks the [`JobState`] pipeline strictly in order:
//!
//! 1. parse and validate the body (no side effects before this succeeds)
//! 2. reset the workspace
//! 3. stage inputs, in document order, stopping at the first failure
//! 4. prepare the workflow, load it, and make sure the engine is up
//! 5. execute, unless the caller asked for prepare-only
//! 6. pick the first output file
//! 7. publish it to the job's destination
//!
//! Every failure becomes [`Outcome::Failed`] carrying the last state
//! reached. Nothing escapes [`JobProcessor::process`].

use std::path::PathBuf;
use std::sync::Arc;

use trikot_cloud::Transfer;
use trikot_comfyui::ExecutionEngine;
use trikot_core::workflow::prepare;
use trikot_core::{Job, JobError, JobState, Outcome, PrepareOptions};

use crate::workspace::WorkspaceManager;

/// Runs job attempts against a set of collaborators.
pub struct JobProcessor {
    engine: Arc<dyn ExecutionEngine>,
    transfer: Arc<dyn Transfer>,
    workspace: Arc<dyn WorkspaceManager>,
    options: PrepareOptions,
}

/// Where a successful attempt stopped.
struct Completed {
    state: JobState,
    artifact: Option<PathBuf>,
}

impl JobProcessor {
    pub fn new(
        engine: Arc<dyn ExecutionEngine>,
        transfer: Arc<dyn Transfer>,
        workspace: Arc<dyn WorkspaceManager>,
        options: PrepareOptions,
    ) -> Self {
        Self {
            engine,
            transfer,
            workspace,
            options,
        }
    }

    /// Run one attempt of the job in `body`.
    ///
    /// With `prepare_only`, the attempt stops after the engine has
    /// accepted the workflow and is reachable; nothing runs or is
    /// published.
    pub async fn process(&self, id: &str, body: &str, prepare_only: bool) -> Outcome {
        let mut state = JobState::Received;
        tracing::info!(job_id = id, prepare_only, "Processing job");

        match self.run(id, body, prepare_only, &mut state).await {
            Ok(Completed { state, artifact }) => {
                tracing::info!(
                    job_id = id,
                    state = %state,
                    artifact = ?artifact,
                    "Job succeeded",
                );
                Outcome::Succeeded { state, artifact }
            }
            Err(error) => {
                tracing::error!(
                    job_id = id,
                    state = %state,
                    kind = error.kind(),
                    error = %error,
                    "Job failed",
                );
                Outcome::Failed { state, error }
            }
        }
    }

    async fn run(
        &self,
        id: &str,
        body: &str,
        prepare_only: bool,
        state: &mut JobState,
    ) -> Result<Completed, JobError> {
        let mut job = Job::parse(id, body)?;
        *state = JobState::Validated;
        tracing::debug!(
            job_id = id,
            nodes = job.workflow.len(),
            inputs = job.inputs.len(),
            destination = %job.destination,
            "Job validated",
        );

        self.workspace.reset().await?;
        *state = JobState::WorkspaceReady;

        let input_dir = self.workspace.input_dir();
        for input in &job.inputs {
            let dest = input_dir.join(&input.filename);
            tracing::debug!(job_id = id, filename = %input.filename, source = %input.source, "Staging input");
            self.transfer.fetch(&input.source, &dest).await?;
        }
        *state = JobState::InputsStaged;

        let report = prepare(&mut job.workflow, &self.options, &mut rand::rng());
        tracing::debug!(
            job_id = id,
            seeds_randomized = report.seeds_randomized,
            nodes_marked_for_rerun = report.nodes_marked_for_rerun,
            "Workflow prepared",
        );
        let loaded = self.engine.load_workflow(&job.workflow)?;
        self.engine.ensure_connected().await?;
        *state = JobState::WorkflowPrepared;

        if prepare_only {
            *state = JobState::SkippedForWarmup;
            return Ok(Completed {
                state: *state,
                artifact: None,
            });
        }

        let summary = self.engine.execute(&loaded).await?;
        *state = JobState::Executed;
        tracing::info!(
            job_id = id,
            prompt_id = %summary.prompt_id,
            executed_nodes = summary.executed_nodes,
            cached_nodes = summary.cached_nodes,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Workflow executed",
        );

        let outputs = self
            .engine
            .collect_outputs(&self.workspace.search_dirs())
            .await?;
        let Some(artifact) = outputs.into_iter().next() else {
            return Err(JobError::NoOutput);
        };
        *state = JobState::OutputCollected;

        self.transfer.publish(&artifact, &job.destination).await?;
        *state = JobState::Published;
        tracing::info!(
            job_id = id,
            artifact = %artifact.display(),
            destination = %job.destination,
            "Output published",
        );

        Ok(Completed {
            state: *state,
            artifact: Some(artifact),
        })
    }
}
