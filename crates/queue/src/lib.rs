//! Job queue transport.
//!
//! [`JobQueue`] is the narrow receive/ack contract the consumption loop
//! needs; [`SqsQueue`] implements it on Amazon SQS.

pub mod consumer;
pub mod error;
pub mod sqs;

pub use consumer::{JobQueue, QueueMessage};
pub use error::TransportError;
pub use sqs::SqsQueue;
