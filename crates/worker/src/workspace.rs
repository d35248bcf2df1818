//! Per-attempt scratch directories.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use trikot_core::JobError;

/// The directories a job attempt reads from and writes to.
#[async_trait]
pub trait WorkspaceManager: Send + Sync {
    /// Empty every workspace directory, creating any that are missing.
    async fn reset(&self) -> Result<(), JobError>;

    /// Where input files are staged.
    fn input_dir(&self) -> &Path;

    /// Where the engine may have written outputs, in priority order.
    fn search_dirs(&self) -> Vec<PathBuf>;
}

/// Workspace on the local filesystem: input, output, and engine temp dirs.
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    input_dir: PathBuf,
    output_dir: PathBuf,
    temp_dir: PathBuf,
}

impl LocalWorkspace {
    pub fn new(input_dir: PathBuf, output_dir: PathBuf, temp_dir: PathBuf) -> Self {
        Self {
            input_dir,
            output_dir,
            temp_dir,
        }
    }

    fn dirs(&self) -> [&Path; 3] {
        [&self.input_dir, &self.output_dir, &self.temp_dir]
    }
}

#[async_trait]
impl WorkspaceManager for LocalWorkspace {
    async fn reset(&self) -> Result<(), JobError> {
        for dir in self.dirs() {
            match tokio::fs::remove_dir_all(dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(JobError::filesystem(dir, e)),
            }
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| JobError::filesystem(dir, e))?;
        }
        tracing::debug!(
            input_dir = %self.input_dir.display(),
            output_dir = %self.output_dir.display(),
            temp_dir = %self.temp_dir.display(),
            "Workspace reset",
        );
        Ok(())
    }

    fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    fn search_dirs(&self) -> Vec<PathBuf> {
        vec![self.output_dir.clone(), self.temp_dir.clone()]
    }
}
