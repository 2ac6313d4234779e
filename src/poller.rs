//! Queue Poller - the consumption loop.
//!
//! ```text
//!            request_stop()            batch finished
//! RUNNING ─────────────────▶ DRAINING ───────────────▶ STOPPED
//!    │                                                   │
//!    └─ long-poll ─▶ dispatch ─▶ delete / dead-letter    └─ store.close()
//! ```
//!
//! Each cycle long-polls the source queue for one bounded batch and drives
//! every message in it to a terminal [`Outcome`]:
//!
//! - `Success`: delete the message from the source queue
//! - any failure: publish the original body to the DLQ, log category and
//!   reason, then delete the message from the source queue
//!
//! Deletion happens even if the dead-letter publish fails, so a processed
//! message never stays in the source queue.
//!
//! Within a batch, messages are grouped by ordering key (FIFO message
//! group). A group is always processed in fetch order; separate groups run
//! one after another, or concurrently when `concurrent_groups` is set.
//!
//! The stop flag is checked before each fetch and after each batch. A stop
//! that arrives mid-batch switches the state to `Draining` at once, but an
//! in-flight fetch or handler call is never cancelled.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::MAX_POLL_WAIT_SECS;
use crate::dispatcher::{Dispatcher, Outcome};
use crate::dlq::DeadLetterQueue;
use crate::queue::{QueueError, QueueMessage, SqsApi};
use crate::shutdown::ShutdownSignal;
use crate::store::DocumentStore;

/// Poller tuning, usually built from
/// [`ConsumerConfig::poller_settings`](crate::config::ConsumerConfig::poller_settings).
#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub queue_url: String,

    /// Upper bound on messages per fetch
    pub max_messages: i32,

    /// Long-poll wait per fetch
    pub wait_time: Duration,

    /// Pause after a failed fetch
    pub receive_error_backoff: Duration,

    pub concurrent_groups: bool,

    /// Log statistics every N handled messages (0 disables)
    pub stats_interval: u64,
}

impl PollerSettings {
    pub fn new(queue_url: impl Into<String>) -> Self {
        Self {
            queue_url: queue_url.into(),
            max_messages: 10,
            wait_time: Duration::from_secs(20),
            receive_error_backoff: Duration::from_secs(5),
            concurrent_groups: false,
            stats_interval: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Running,
    Draining,
    Stopped,
}

/// Counters accumulated over a poller run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollerStats {
    pub batches: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub dead_lettered: u64,
    pub dead_letter_failures: u64,
    pub delete_failures: u64,
    pub receive_errors: u64,
}

impl PollerStats {
    /// Messages that reached a terminal outcome
    pub fn handled(&self) -> u64 {
        self.succeeded + self.failed
    }

    fn record(&mut self, report: &MessageReport) {
        if report.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        match report.dead_lettered {
            Some(true) => self.dead_lettered += 1,
            Some(false) => self.dead_letter_failures += 1,
            None => {}
        }
        if !report.deleted {
            self.delete_failures += 1;
        }
    }
}

/// What happened to one message.
#[derive(Debug)]
struct MessageReport {
    success: bool,
    /// `None` when no dead-letter publish was needed
    dead_lettered: Option<bool>,
    deleted: bool,
}

/// Split a batch into ordering-key groups, keeping fetch order inside each
/// group and first-seen order across groups. Messages without a key share
/// one group.
pub fn partition_by_ordering_key(batch: Vec<QueueMessage>) -> Vec<Vec<QueueMessage>> {
    let mut groups: Vec<(Option<String>, Vec<QueueMessage>)> = Vec::new();
    for message in batch {
        match groups.iter_mut().find(|(key, _)| *key == message.ordering_key) {
            Some((_, group)) => group.push(message),
            None => groups.push((message.ordering_key.clone(), vec![message])),
        }
    }
    groups.into_iter().map(|(_, group)| group).collect()
}

pub struct Poller {
    api: Arc<dyn SqsApi>,
    dispatcher: Dispatcher,
    dlq: DeadLetterQueue,
    store: Arc<dyn DocumentStore>,
    shutdown: ShutdownSignal,
    settings: PollerSettings,
    state: watch::Sender<PollerState>,
}

impl Poller {
    /// `store` is the shared connection the handlers write through; the
    /// poller closes it once after reaching [`PollerState::Stopped`].
    pub fn new(
        api: Arc<dyn SqsApi>,
        dispatcher: Dispatcher,
        dlq: DeadLetterQueue,
        store: Arc<dyn DocumentStore>,
        shutdown: ShutdownSignal,
        settings: PollerSettings,
    ) -> Self {
        let (state, _) = watch::channel(PollerState::Running);
        Self {
            api,
            dispatcher,
            dlq,
            store,
            shutdown,
            settings,
            state,
        }
    }

    pub fn state(&self) -> PollerState {
        *self.state.borrow()
    }

    /// Observe state transitions from another task.
    pub fn subscribe_state(&self) -> watch::Receiver<PollerState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: PollerState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!(from = ?previous, to = ?next, "Poller state changed");
        }
    }

    /// Run until a stop is requested and the current batch is finished.
    pub async fn run(self) -> PollerStats {
        info!(
            queue_url = %self.settings.queue_url,
            dlq_url = %self.dlq.url(),
            max_messages = self.settings.max_messages,
            wait_secs = self.settings.wait_time.as_secs(),
            concurrent_groups = self.settings.concurrent_groups,
            "Listening for events"
        );

        let mut stats = PollerStats::default();

        while !self.shutdown.should_stop() {
            let batch = match self.fetch().await {
                Ok(batch) => batch,
                Err(e) => {
                    stats.receive_errors += 1;
                    error!(error = %e, "Error receiving messages");
                    self.backoff().await;
                    continue;
                }
            };

            if batch.is_empty() {
                continue;
            }

            let handled_before = stats.handled();
            self.drain_batch(batch, &mut stats).await;
            stats.batches += 1;

            let interval = self.settings.stats_interval;
            if interval > 0 && handled_before / interval != stats.handled() / interval {
                info!(
                    succeeded = stats.succeeded,
                    failed = stats.failed,
                    dead_lettered = stats.dead_lettered,
                    "Worker statistics"
                );
            }
        }

        self.set_state(PollerState::Draining);
        self.set_state(PollerState::Stopped);
        self.store.close().await;

        info!(
            batches = stats.batches,
            succeeded = stats.succeeded,
            failed = stats.failed,
            dead_lettered = stats.dead_lettered,
            dead_letter_failures = stats.dead_letter_failures,
            "Poller stopped"
        );

        stats
    }

    async fn fetch(&self) -> Result<Vec<QueueMessage>, QueueError> {
        let wait_secs = self.settings.wait_time.as_secs().min(MAX_POLL_WAIT_SECS) as i32;
        let batch = self
            .api
            .receive_messages(&self.settings.queue_url, self.settings.max_messages, wait_secs)
            .await?;

        if !batch.is_empty() {
            debug!(count = batch.len(), "Fetched batch");
        }
        Ok(batch)
    }

    /// Sleep after a failed fetch; a stop request cuts the pause short.
    async fn backoff(&self) {
        tokio::select! {
            _ = tokio::time::sleep(self.settings.receive_error_backoff) => {}
            _ = self.shutdown.stopped() => {}
        }
    }

    /// Process a fetched batch to completion. A stop requested meanwhile
    /// moves the poller to `Draining` right away; the batch is not cut short.
    async fn drain_batch(&self, batch: Vec<QueueMessage>, stats: &mut PollerStats) {
        let processing = self.process_batch(batch, stats);
        tokio::pin!(processing);

        tokio::select! {
            biased;
            _ = self.shutdown.stopped() => {
                self.set_state(PollerState::Draining);
                processing.await;
            }
            _ = &mut processing => {}
        }
    }

    async fn process_batch(&self, batch: Vec<QueueMessage>, stats: &mut PollerStats) {
        let groups = partition_by_ordering_key(batch);

        let reports: Vec<MessageReport> = if self.settings.concurrent_groups && groups.len() > 1 {
            join_all(groups.iter().map(|group| self.process_group(group)))
                .await
                .into_iter()
                .flatten()
                .collect()
        } else {
            let mut reports = Vec::new();
            for group in &groups {
                reports.extend(self.process_group(group).await);
            }
            reports
        };

        for report in &reports {
            stats.record(report);
        }
    }

    async fn process_group(&self, group: &[QueueMessage]) -> Vec<MessageReport> {
        let mut reports = Vec::with_capacity(group.len());
        for message in group {
            reports.push(self.handle_message(message).await);
        }
        reports
    }

    async fn handle_message(&self, message: &QueueMessage) -> MessageReport {
        let result = self.dispatcher.dispatch(message).await;
        let event_type = result.event_type.as_deref().unwrap_or("unknown");

        let mut report = MessageReport {
            success: result.is_success(),
            dead_lettered: None,
            deleted: false,
        };

        match &result.outcome {
            Outcome::Success(_) => {
                info!(
                    message_id = %message.message_id,
                    event_type = %event_type,
                    category = result.outcome.category(),
                    "Event processed successfully"
                );
            }
            failure => {
                let published = self.dlq.publish(message).await;
                error!(
                    message_id = %message.message_id,
                    event_type = %event_type,
                    category = failure.category(),
                    reason = failure.reason().unwrap_or_default(),
                    "Event processing failed"
                );
                report.dead_lettered = Some(match published {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(
                            message_id = %message.message_id,
                            error = %e,
                            "Dead-letter publish failed, deleting source message anyway"
                        );
                        false
                    }
                });
            }
        }

        match self
            .api
            .delete_message(&self.settings.queue_url, &message.receipt)
            .await
        {
            Ok(()) => {
                debug!(message_id = %message.message_id, "Deleted message");
                report.deleted = true;
            }
            Err(e) => {
                warn!(
                    message_id = %message.message_id,
                    error = %e,
                    "Failed to delete message"
                );
            }
        }

        report
    }
}
