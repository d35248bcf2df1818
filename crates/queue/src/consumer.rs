//! Queue transport trait and message type.

use std::time::Duration;

use async_trait::async_trait;
use trikot_core::types::{MessageId, Timestamp};

use crate::error::TransportError;

/// A job message as received from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Provider message id; becomes the job id.
    pub id: MessageId,
    /// Raw body, expected to be a job document.
    pub body: String,
    /// Handle used to acknowledge this particular delivery.
    pub receipt_handle: String,
    /// How many times the message has been delivered, this one included.
    pub receive_count: u32,
    /// When the producer sent the message, if the provider reports it.
    pub sent_at: Option<Timestamp>,
}

impl QueueMessage {
    /// Whether an earlier delivery of this message was not acknowledged.
    pub fn is_redelivery(&self) -> bool {
        self.receive_count > 1
    }

    /// Time between sending and `now`; `None` without a send time or
    /// when the clocks disagree.
    pub fn queued_for(&self, now: Timestamp) -> Option<Duration> {
        (now - self.sent_at?).to_std().ok()
    }
}

/// Receive and acknowledge job messages one at a time.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Long-poll for up to `wait`. `Ok(None)` means nothing arrived.
    async fn receive(&self, wait: Duration) -> Result<Option<QueueMessage>, TransportError>;

    /// Delete the message so it is never delivered again.
    async fn ack(&self, receipt_handle: &str) -> Result<(), TransportError>;

    /// Give up on a failed delivery.
    ///
    /// The default leaves the message alone; it becomes visible again
    /// once its visibility timeout expires and is redelivered.
    async fn nack(&self, _receipt_handle: &str) -> Result<(), TransportError> {
        Ok(())
    }
}
