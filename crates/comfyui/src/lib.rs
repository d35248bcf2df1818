//! ComfyUI execution engine adapter.
//!
//! Owns the ComfyUI side process ([`server::EngineServer`]), talks to it
//! over REST ([`api`]) and WebSocket ([`client`], [`completion`]), and
//! exposes the narrow [`ExecutionEngine`] contract the job processor
//! drives: load, connect, execute, collect outputs.

pub mod api;
pub mod client;
pub mod completion;
pub mod config;
pub mod engine;
pub mod error;
pub mod messages;
pub mod outputs;
pub mod reconnect;
pub mod server;

pub use config::EngineConfig;
pub use engine::{ComfyUIEngine, ExecutionEngine, ExecutionSummary, LoadedWorkflow};
pub use error::EngineError;
pub use server::EngineServer;
