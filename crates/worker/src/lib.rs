//! The trikot render worker.
//!
//! Pulls render jobs off a queue one at a time, stages their inputs,
//! runs the workflow on a local ComfyUI, publishes the first output
//! file, and acknowledges the message only when all of that succeeded.

pub mod config;
pub mod consumer;
pub mod processor;
pub mod startup;
pub mod warmup;
pub mod workspace;

pub use config::WorkerConfig;
pub use consumer::{run_loop, LoopConfig, LoopStats};
pub use processor::JobProcessor;
pub use workspace::{LocalWorkspace, WorkspaceManager};
