//! Queue transport error types.

use thiserror::Error;

/// Failures talking to the queue. The consumption loop logs these and
/// backs off; they never fail a job.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("receive failed: {0}")]
    Receive(String),

    #[error("acknowledge failed: {0}")]
    Ack(String),

    /// The provider returned a message the worker cannot act on.
    #[error("malformed queue message: {0}")]
    Malformed(String),
}
