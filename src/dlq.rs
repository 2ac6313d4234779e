//! Dead Letter Queue publishing.
//!
//! Messages whose processing ended in any failure category are republished,
//! body unchanged, to a separate queue for manual investigation.
//!
//! For FIFO dead-letter queues the source message group is kept (or
//! `dlq-group` when the source message had none) and every publish gets a
//! fresh deduplication ID.
//!
//! # Example
//!
//! ```rust,ignore
//! use event_consumer::dlq::DeadLetterQueue;
//!
//! let dlq = DeadLetterQueue::new(sqs_api.clone(), dlq_url);
//! dlq.publish(&message).await?;
//! ```

use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::queue::{is_fifo_queue, QueueError, QueueMessage, SendOptions, SqsApi};
use crate::DEFAULT_DLQ_GROUP;

/// Errors that can occur when publishing to the Dead Letter Queue.
#[derive(Debug, Error)]
pub enum DlqError {
    #[error("dead-letter publish failed: {0}")]
    Publish(#[from] QueueError),
}

/// Publisher for the Dead Letter Queue.
#[derive(Clone)]
pub struct DeadLetterQueue {
    api: Arc<dyn SqsApi>,
    url: String,
}

impl DeadLetterQueue {
    pub fn new(api: Arc<dyn SqsApi>, url: impl Into<String>) -> Self {
        Self {
            api,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn send_options(&self, message: &QueueMessage) -> SendOptions {
        if !is_fifo_queue(&self.url) {
            return SendOptions::default();
        }
        let group = message
            .ordering_key
            .clone()
            .unwrap_or_else(|| DEFAULT_DLQ_GROUP.to_string());
        SendOptions::fifo(group, Uuid::new_v4().to_string())
    }

    /// Republish the original message body, returning the DLQ message ID.
    pub async fn publish(&self, message: &QueueMessage) -> Result<String, DlqError> {
        let options = self.send_options(message);

        let id = self
            .api
            .send_message(&self.url, &message.body, options)
            .await
            .map_err(|e| {
                error!(
                    message_id = %message.message_id,
                    error = %e,
                    "Failed to send message to DLQ"
                );
                DlqError::Publish(e)
            })?;

        info!(
            dlq_id = %id,
            original_id = %message.message_id,
            "Message moved to Dead Letter Queue"
        );

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{message, FakeQueue};

    const FIFO_DLQ: &str = "https://sqs.us-east-1.amazonaws.com/123/events-dlq.fifo";

    #[tokio::test]
    async fn test_publishes_body_unchanged() {
        let queue = Arc::new(FakeQueue::new());
        let dlq = DeadLetterQueue::new(queue.clone(), FIFO_DLQ);
        let body = r#"{ "eventName" : "UnknownEvent", "eventData" : {} }"#;

        dlq.publish(&message("m-1", body)).await.unwrap();

        let sent = queue.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, FIFO_DLQ);
        assert_eq!(sent[0].1, body);
    }

    #[tokio::test]
    async fn test_fifo_keeps_group_and_fresh_dedup_id() {
        let queue = Arc::new(FakeQueue::new());
        let dlq = DeadLetterQueue::new(queue.clone(), FIFO_DLQ);

        let grouped = message("m-1", "{}").with_ordering_key("plant-7");
        dlq.publish(&grouped).await.unwrap();
        dlq.publish(&grouped).await.unwrap();
        dlq.publish(&message("m-2", "{}")).await.unwrap();

        let sent = queue.sent();
        assert_eq!(sent[0].2.group_id.as_deref(), Some("plant-7"));
        assert_eq!(sent[2].2.group_id.as_deref(), Some(DEFAULT_DLQ_GROUP));
        assert!(sent[0].2.deduplication_id.is_some());
        assert_ne!(sent[0].2.deduplication_id, sent[1].2.deduplication_id);
    }

    #[tokio::test]
    async fn test_standard_queue_gets_no_fifo_attributes() {
        let queue = Arc::new(FakeQueue::new());
        let dlq = DeadLetterQueue::new(queue.clone(), "https://sqs/123/events-dlq");

        dlq.publish(&message("m-1", "{}").with_ordering_key("g"))
            .await
            .unwrap();

        assert_eq!(queue.sent()[0].2, SendOptions::default());
    }

    #[tokio::test]
    async fn test_publish_failure_is_reported() {
        let queue = Arc::new(FakeQueue::new().failing_sends());
        let dlq = DeadLetterQueue::new(queue, FIFO_DLQ);

        let result = dlq.publish(&message("m-1", "{}")).await;
        assert!(matches!(result, Err(DlqError::Publish(_))));
    }
}
