//! Job lifecycle states and the per-attempt outcome.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::JobError;

/// States of one job attempt, in the only order they can be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Received,
    Validated,
    WorkspaceReady,
    InputsStaged,
    WorkflowPrepared,
    /// Prepare-only attempts stop here.
    SkippedForWarmup,
    Executed,
    OutputCollected,
    Published,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::WorkspaceReady => "workspace_ready",
            Self::InputsStaged => "inputs_staged",
            Self::WorkflowPrepared => "workflow_prepared",
            Self::SkippedForWarmup => "skipped_for_warmup",
            Self::Executed => "executed",
            Self::OutputCollected => "output_collected",
            Self::Published => "published",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict of one job attempt. Drives queue acknowledgment.
#[derive(Debug)]
pub enum Outcome {
    Succeeded {
        /// `Published`, or `SkippedForWarmup` in prepare-only mode.
        state: JobState,
        /// The local file that was published, if any.
        artifact: Option<PathBuf>,
    },
    Failed {
        /// Last state reached before the failure.
        state: JobState,
        error: JobError,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn state(&self) -> JobState {
        match self {
            Self::Succeeded { state, .. } | Self::Failed { state, .. } => *state,
        }
    }

    /// The failure cause, if the attempt failed.
    pub fn cause(&self) -> Option<&JobError> {
        match self {
            Self::Succeeded { .. } => None,
            Self::Failed { error, .. } => Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_are_ordered_along_the_pipeline() {
        assert!(JobState::Received < JobState::Validated);
        assert!(JobState::WorkflowPrepared < JobState::SkippedForWarmup);
        assert!(JobState::OutputCollected < JobState::Published);
    }

    #[test]
    fn failed_outcome_exposes_cause() {
        let outcome = Outcome::Failed {
            state: JobState::Executed,
            error: JobError::NoOutput,
        };
        assert!(!outcome.is_success());
        assert_eq!(outcome.state(), JobState::Executed);
        assert_eq!(outcome.cause().map(JobError::kind), Some("no_output"));
    }

    #[test]
    fn state_serializes_snake_case() {
        let json = serde_json::to_string(&JobState::SkippedForWarmup).unwrap();
        assert_eq!(json, r#""skipped_for_warmup""#);
        assert_eq!(JobState::WorkspaceReady.to_string(), "workspace_ready");
    }
}
