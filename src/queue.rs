//! Source queue transport.
//!
//! [`SqsApi`] is the narrow surface the poller and the dead-letter publisher
//! need from an SQS-compatible queue: long-poll receive, delete by receipt and
//! send. The real AWS client lives in [`real`] behind the `sqs` feature;
//! tests use in-memory implementations.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Errors returned by queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("receive failed: {0}")]
    Receive(String),

    #[error("delete failed: {0}")]
    Delete(String),

    #[error("send failed: {0}")]
    Send(String),
}

/// Opaque handle identifying a fetched message for deletion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptToken(String);

impl ReceiptToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReceiptToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message as fetched from the source queue.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    /// Queue-assigned message ID, used for logging
    pub message_id: String,

    /// Raw message body, forwarded unchanged to the dead-letter queue
    pub body: String,

    /// Receipt used to delete the message
    pub receipt: ReceiptToken,

    /// FIFO message group. Messages sharing a key are processed in fetch order.
    pub ordering_key: Option<String>,
}

impl QueueMessage {
    pub fn new(
        message_id: impl Into<String>,
        body: impl Into<String>,
        receipt: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            body: body.into(),
            receipt: ReceiptToken::new(receipt),
            ordering_key: None,
        }
    }

    /// Set the ordering key (FIFO message group ID)
    pub fn with_ordering_key(mut self, key: impl Into<String>) -> Self {
        self.ordering_key = Some(key.into());
        self
    }
}

/// FIFO attributes attached to an outgoing message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendOptions {
    pub group_id: Option<String>,
    pub deduplication_id: Option<String>,
}

impl SendOptions {
    pub fn fifo(group_id: impl Into<String>, deduplication_id: impl Into<String>) -> Self {
        Self {
            group_id: Some(group_id.into()),
            deduplication_id: Some(deduplication_id.into()),
        }
    }
}

#[async_trait]
pub trait SqsApi: Send + Sync {
    /// Long-poll for up to `max_messages`, waiting at most `wait_time_secs`.
    async fn receive_messages(
        &self,
        queue_url: &str,
        max_messages: i32,
        wait_time_secs: i32,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    async fn delete_message(&self, queue_url: &str, receipt: &ReceiptToken)
        -> Result<(), QueueError>;

    /// Send a message body, returning the queue-assigned message ID.
    async fn send_message(
        &self,
        queue_url: &str,
        body: &str,
        options: SendOptions,
    ) -> Result<String, QueueError>;
}

/// Returns true for SQS FIFO queue URLs (which require group/dedup IDs).
pub fn is_fifo_queue(queue_url: &str) -> bool {
    queue_url.ends_with(".fifo")
}

/// Real SQS client adapter (only compiled when the `sqs` feature is enabled).
#[cfg(feature = "sqs")]
pub mod real {
    use super::{QueueError, QueueMessage, ReceiptToken, SendOptions, SqsApi};
    use aws_config::BehaviorVersion;
    use aws_sdk_sqs::config::Region;
    use aws_sdk_sqs::error::DisplayErrorContext;
    use aws_sdk_sqs::types::MessageSystemAttributeName;
    use aws_sdk_sqs::Client as SqsClient;
    use tracing::{instrument, warn};

    #[derive(Clone)]
    pub struct AwsSqsApi {
        inner: SqsClient,
    }

    impl AwsSqsApi {
        pub fn new(inner: SqsClient) -> Self {
            Self { inner }
        }

        /// Build a client from the default AWS credential chain.
        ///
        /// `endpoint_url` points the client at an SQS-compatible endpoint
        /// such as LocalStack.
        pub async fn from_env(region: &str, endpoint_url: Option<&str>) -> Self {
            let shared = aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(region.to_string()))
                .load()
                .await;

            let mut builder = aws_sdk_sqs::config::Builder::from(&shared);
            if let Some(url) = endpoint_url {
                builder = builder.endpoint_url(url);
            }

            Self::new(SqsClient::from_conf(builder.build()))
        }
    }

    #[async_trait::async_trait]
    impl SqsApi for AwsSqsApi {
        #[instrument(level = "debug", skip(self))]
        async fn receive_messages(
            &self,
            queue_url: &str,
            max_messages: i32,
            wait_time_secs: i32,
        ) -> Result<Vec<QueueMessage>, QueueError> {
            let resp = self
                .inner
                .receive_message()
                .queue_url(queue_url)
                .max_number_of_messages(max_messages)
                .wait_time_seconds(wait_time_secs)
                .message_system_attribute_names(MessageSystemAttributeName::MessageGroupId)
                .message_attribute_names("All")
                .send()
                .await
                .map_err(|e| QueueError::Receive(DisplayErrorContext(e).to_string()))?;

            let mut out = Vec::new();
            for m in resp.messages.unwrap_or_default() {
                let message_id = m.message_id.unwrap_or_default();
                let Some(receipt) = m.receipt_handle else {
                    warn!(message_id = %message_id, "Received message without receipt handle");
                    continue;
                };
                let ordering_key = m
                    .attributes
                    .and_then(|attrs| attrs.get(&MessageSystemAttributeName::MessageGroupId).cloned());

                out.push(QueueMessage {
                    message_id,
                    body: m.body.unwrap_or_default(),
                    receipt: ReceiptToken::new(receipt),
                    ordering_key,
                });
            }
            Ok(out)
        }

        #[instrument(level = "debug", skip(self))]
        async fn delete_message(
            &self,
            queue_url: &str,
            receipt: &ReceiptToken,
        ) -> Result<(), QueueError> {
            self.inner
                .delete_message()
                .queue_url(queue_url)
                .receipt_handle(receipt.as_str())
                .send()
                .await
                .map_err(|e| QueueError::Delete(DisplayErrorContext(e).to_string()))?;
            Ok(())
        }

        #[instrument(level = "debug", skip(self, body))]
        async fn send_message(
            &self,
            queue_url: &str,
            body: &str,
            options: SendOptions,
        ) -> Result<String, QueueError> {
            let resp = self
                .inner
                .send_message()
                .queue_url(queue_url)
                .message_body(body)
                .set_message_group_id(options.group_id)
                .set_message_deduplication_id(options.deduplication_id)
                .send()
                .await
                .map_err(|e| QueueError::Send(DisplayErrorContext(e).to_string()))?;
            Ok(resp.message_id.unwrap_or_default())
        }
    }
}
