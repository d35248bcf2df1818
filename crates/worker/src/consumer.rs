//! Queue consumption loop.
//!
//! Receives one message at a time, hands it to the [`JobProcessor`], and
//! deletes it only when the attempt succeeded. Failed jobs are handed to
//! [`JobQueue::nack`], which by default leaves them for redelivery after
//! the visibility timeout. Transport errors are logged and followed by a
//! fixed backoff.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use trikot_queue::{JobQueue, QueueMessage};

use crate::processor::JobProcessor;

/// Counters kept over the lifetime of the loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    /// Messages handed to the processor.
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Receive, ack or nack failures.
    pub transport_errors: u64,
}

/// Loop timing.
#[derive(Debug, Clone, Copy)]
pub struct LoopConfig {
    /// Long-poll duration per receive.
    pub wait_time: Duration,
    /// Pause after a transport error.
    pub error_backoff: Duration,
}

/// Run until `cancel` fires. An in-flight job always runs to completion.
pub async fn run_loop(
    queue: &dyn JobQueue,
    processor: &JobProcessor,
    config: LoopConfig,
    cancel: &CancellationToken,
) -> LoopStats {
    let mut stats = LoopStats::default();
    tracing::info!(
        wait_secs = config.wait_time.as_secs(),
        backoff_secs = config.error_backoff.as_secs(),
        "Queue consumption loop started",
    );

    while !cancel.is_cancelled() {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            received = queue.receive(config.wait_time) => received,
        };

        let message = match received {
            Ok(Some(message)) => message,
            Ok(None) => {
                tracing::trace!("No message received");
                continue;
            }
            Err(e) => {
                stats.transport_errors += 1;
                tracing::error!(error = %e, "Failed to receive from queue");
                backoff(config.error_backoff, cancel).await;
                continue;
            }
        };

        handle_message(queue, processor, &message, &mut stats, config, cancel).await;
    }

    tracing::info!(
        processed = stats.processed,
        succeeded = stats.succeeded,
        failed = stats.failed,
        transport_errors = stats.transport_errors,
        "Queue consumption loop stopped",
    );
    stats
}

async fn handle_message(
    queue: &dyn JobQueue,
    processor: &JobProcessor,
    message: &QueueMessage,
    stats: &mut LoopStats,
    config: LoopConfig,
    cancel: &CancellationToken,
) {
    tracing::info!(
        job_id = %message.id,
        receive_count = message.receive_count,
        redelivery = message.is_redelivery(),
        queued_ms = message.queued_for(Utc::now()).map(|d| d.as_millis() as u64),
        "Received job",
    );

    let outcome = processor.process(&message.id, &message.body, false).await;
    stats.processed += 1;

    let settled = if outcome.is_success() {
        stats.succeeded += 1;
        queue.ack(&message.receipt_handle).await.map(|()| {
            tracing::info!(job_id = %message.id, "Job acknowledged");
        })
    } else {
        stats.failed += 1;
        tracing::warn!(
            job_id = %message.id,
            state = %outcome.state(),
            "Job failed, returning it to the queue",
        );
        queue.nack(&message.receipt_handle).await
    };

    if let Err(e) = settled {
        stats.transport_errors += 1;
        tracing::error!(job_id = %message.id, error = %e, "Failed to settle job with the queue");
        backoff(config.error_backoff, cancel).await;
    }
}

/// Sleep for `delay` unless shutdown is requested first.
async fn backoff(delay: Duration, cancel: &CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(delay) => {}
    }
}
