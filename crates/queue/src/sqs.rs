//! Amazon SQS transport.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_sqs::config::{BehaviorVersion, Region};
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::{Message, MessageSystemAttributeName};
use aws_sdk_sqs::Client;
use chrono::{TimeZone, Utc};

use crate::consumer::{JobQueue, QueueMessage};
use crate::error::TransportError;

/// Longest long-poll SQS accepts.
const MAX_WAIT_SECS: u64 = 20;

/// Longest visibility timeout SQS accepts (12 hours).
pub const MAX_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(43_200);

/// SQS-backed [`JobQueue`].
pub struct SqsQueue {
    client: Client,
    queue_url: String,
    visibility_timeout: Option<Duration>,
}

impl SqsQueue {
    pub fn new(client: Client, queue_url: String, visibility_timeout: Option<Duration>) -> Self {
        Self {
            client,
            queue_url,
            visibility_timeout,
        }
    }

    /// Build a client from the default AWS credential chain.
    pub async fn from_env(
        region: &str,
        endpoint_url: Option<&str>,
        queue_url: String,
        visibility_timeout: Option<Duration>,
    ) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        let mut builder = aws_sdk_sqs::config::Builder::from(&sdk_config);
        if let Some(endpoint) = endpoint_url.filter(|e| !e.is_empty()) {
            builder = builder.endpoint_url(endpoint);
        }

        tracing::info!(
            queue_url = %queue_url,
            region,
            endpoint = ?endpoint_url,
            "SQS queue initialized",
        );

        Self::new(Client::from_conf(builder.build()), queue_url, visibility_timeout)
    }
}

#[async_trait]
impl JobQueue for SqsQueue {
    async fn receive(&self, wait: Duration) -> Result<Option<QueueMessage>, TransportError> {
        let wait_secs = wait.as_secs().min(MAX_WAIT_SECS) as i32;

        let mut request = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(1)
            .wait_time_seconds(wait_secs)
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .message_system_attribute_names(MessageSystemAttributeName::SentTimestamp);
        if let Some(timeout) = self.visibility_timeout {
            request = request.visibility_timeout(visibility_secs(timeout));
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Receive(DisplayErrorContext(&e).to_string()))?;

        match response.messages.unwrap_or_default().into_iter().next() {
            Some(message) => to_queue_message(message).map(Some),
            None => Ok(None),
        }
    }

    async fn ack(&self, receipt_handle: &str) -> Result<(), TransportError> {
        tracing::debug!(receipt_handle, "Deleting SQS message");

        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| TransportError::Ack(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }
}

fn visibility_secs(timeout: Duration) -> i32 {
    timeout.min(MAX_VISIBILITY_TIMEOUT).as_secs() as i32
}

/// Convert an SQS message, rejecting one without a receipt handle.
fn to_queue_message(message: Message) -> Result<QueueMessage, TransportError> {
    let id = message.message_id().unwrap_or("unknown").to_string();

    let receipt_handle = message
        .receipt_handle()
        .ok_or_else(|| TransportError::Malformed(format!("message {id} has no receipt handle")))?
        .to_string();

    let attribute = |name: MessageSystemAttributeName| {
        message
            .attributes()
            .and_then(|attrs| attrs.get(&name))
            .map(String::as_str)
    };

    let receive_count = attribute(MessageSystemAttributeName::ApproximateReceiveCount)
        .and_then(|c| c.parse::<u32>().ok())
        .unwrap_or(1);

    let sent_at = attribute(MessageSystemAttributeName::SentTimestamp)
        .and_then(|ts| ts.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single());

    Ok(QueueMessage {
        body: message.body().unwrap_or_default().to_string(),
        id,
        receipt_handle,
        receive_count,
        sent_at,
    })
}
