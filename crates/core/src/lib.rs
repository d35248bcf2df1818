//! Domain model for the trikot render worker.
//!
//! Holds everything about a render job that does not touch the network
//! or the filesystem: the job descriptor and its validation, the
//! workflow graph and its per-attempt preparation, the failure
//! taxonomy, and the [`Outcome`] that drives queue acknowledgment.

pub mod error;
pub mod job;
pub mod outcome;
pub mod types;
pub mod workflow;

pub use error::JobError;
pub use job::{InputFile, Job};
pub use outcome::{JobState, Outcome};
pub use workflow::{NodeLink, PrepareOptions, PrepareReport, Workflow, DEFAULT_MAX_SEED};
