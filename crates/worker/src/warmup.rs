//! Warm-up job run once before the consumption loop.
//!
//! The warm-up document is a regular job body, read from a local path
//! or fetched from an `s3://` / `http(s)://` locator into a scratch
//! directory outside the workspace, removed once the warm-up is over. It is processed in prepare-only
//! mode so ComfyUI imports its nodes and models before the first real
//! job arrives. Nothing is acknowledged and a failure never stops the
//! worker.

use std::path::{Path, PathBuf};

use trikot_cloud::{Transfer, TransferError};
use trikot_core::Outcome;

use crate::processor::JobProcessor;

/// Job id used for the warm-up attempt.
pub const WARMUP_JOB_ID: &str = "warmup";

const SCRATCH_FILE: &str = "warmup-job.json";

#[derive(Debug, thiserror::Error)]
pub enum WarmupError {
    #[error("failed to fetch warm-up job: {0}")]
    Fetch(#[from] TransferError),

    #[error("failed to read warm-up job {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Read the warm-up body from `source`.
///
/// Anything containing `://` is treated as a locator and fetched into
/// `scratch_dir`; everything else is a local path.
pub async fn load_warmup_body(
    source: &str,
    transfer: &dyn Transfer,
    scratch_dir: &Path,
) -> Result<String, WarmupError> {
    let path = if source.contains("://") {
        let dest = scratch_dir.join(SCRATCH_FILE);
        transfer.fetch(source, &dest).await?;
        dest
    } else {
        PathBuf::from(source)
    };

    tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| WarmupError::Read { path, source })
}

/// Load and run the warm-up job. Returns `None` when it could not be
/// loaded; the outcome otherwise, which is only logged.
///
/// Remote documents are fetched into a fresh directory under
/// `scratch_parent` that is deleted before returning.
pub async fn run_warmup(
    source: &str,
    transfer: &dyn Transfer,
    processor: &JobProcessor,
    scratch_parent: &Path,
) -> Option<Outcome> {
    tracing::info!(source, "Running warm-up job");

    let scratch = match tempfile::Builder::new()
        .prefix("trikot-warmup-")
        .tempdir_in(scratch_parent)
    {
        Ok(dir) => dir,
        Err(e) => {
            tracing::warn!(
                scratch_parent = %scratch_parent.display(),
                error = %e,
                "Skipping warm-up job, no scratch directory",
            );
            return None;
        }
    };

    let body = match load_warmup_body(source, transfer, scratch.path()).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(source, error = %e, "Skipping warm-up job");
            return None;
        }
    };

    let outcome = processor.process(WARMUP_JOB_ID, &body, true).await;
    match outcome.cause() {
        None => tracing::info!(state = %outcome.state(), "Warm-up complete"),
        Some(error) => tracing::warn!(
            state = %outcome.state(),
            kind = error.kind(),
            error = %error,
            "Warm-up job failed",
        ),
    }
    Some(outcome)
}
