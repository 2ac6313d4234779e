//! Event Dispatcher.
//!
//! The [`Dispatcher`] turns one fetched message into an [`Outcome`]:
//!
//! ```text
//! QueueMessage
//!     │
//!     ▼
//! parse body ──── bad JSON / missing fields ──▶ MalformedEnvelope
//!     │
//!     ▼
//! registry.resolve ── unknown event ─────────▶ UnroutableEvent
//!     │
//!     ▼
//! validate ─────── error ────────────────────▶ ValidationFailure
//!     │
//!     ▼
//! compute ──────── error ────────────────────▶ ComputeFailure
//!     │
//!     ▼
//! persist ──────── error ────────────────────▶ PersistFailure
//!     │
//!     ▼
//! Success(result)
//! ```
//!
//! Failures are classified by the step that raised them. A panicking handler
//! is caught and classified the same way. The dispatcher never deletes or
//! dead-letters messages; that policy belongs to the poller.

use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::envelope::Envelope;
use crate::handlers::HandlerError;
use crate::queue::QueueMessage;
use crate::registry::Registry;

/// Terminal result of dispatching one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Value),
    ValidationFailure(String),
    ComputeFailure(String),
    PersistFailure(String),
    UnroutableEvent(String),
    MalformedEnvelope(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Stable category name used in logs.
    pub fn category(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::ValidationFailure(_) => "validation_failure",
            Outcome::ComputeFailure(_) => "compute_failure",
            Outcome::PersistFailure(_) => "persist_failure",
            Outcome::UnroutableEvent(_) => "unroutable_event",
            Outcome::MalformedEnvelope(_) => "malformed_envelope",
        }
    }

    /// Failure reason, `None` for success.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Outcome::Success(_) => None,
            Outcome::ValidationFailure(r)
            | Outcome::ComputeFailure(r)
            | Outcome::PersistFailure(r)
            | Outcome::MalformedEnvelope(r) => Some(r),
            Outcome::UnroutableEvent(event_type) => Some(event_type),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{}: {}", self.category(), reason),
            None => f.write_str(self.category()),
        }
    }
}

/// Result of dispatching a message.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    /// Event type, when the body could be parsed far enough to know it
    pub event_type: Option<String>,

    pub outcome: Outcome,
}

impl DispatchResult {
    fn new(event_type: Option<String>, outcome: Outcome) -> Self {
        Self {
            event_type,
            outcome,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

fn panic_reason(payload: Box<dyn Any + Send>) -> String {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };
    format!("handler panicked: {message}")
}

fn step_reason(result: Result<Result<(), HandlerError>, Box<dyn Any + Send>>) -> Option<String> {
    match result {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(payload) => Some(panic_reason(payload)),
    }
}

/// Routes messages to handlers through an immutable [`Registry`].
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Dispatch one message to a terminal [`Outcome`]. Never fails and never
    /// lets a handler panic escape.
    pub async fn dispatch(&self, message: &QueueMessage) -> DispatchResult {
        let envelope = match Envelope::from_message(message) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(message_id = %message.message_id, error = %e, "Malformed envelope");
                return DispatchResult::new(None, Outcome::MalformedEnvelope(e.to_string()));
            }
        };

        let event_type = envelope.event_type.clone();
        let handler = match self.registry.resolve(&event_type) {
            Ok(handler) => handler,
            Err(e) => {
                warn!(
                    event_type = %event_type,
                    available = ?self.registry.event_types(),
                    "{}", e
                );
                return DispatchResult::new(
                    Some(event_type.clone()),
                    Outcome::UnroutableEvent(event_type),
                );
            }
        };

        debug!(
            event_type = %event_type,
            handler = %handler.name(),
            message_id = %message.message_id,
            "Dispatching event"
        );

        let payload = &envelope.payload;

        let validated = panic::catch_unwind(AssertUnwindSafe(|| handler.validate(payload)));
        if let Some(reason) = step_reason(validated) {
            return DispatchResult::new(Some(event_type), Outcome::ValidationFailure(reason));
        }

        let result = match AssertUnwindSafe(handler.compute(payload)).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                return DispatchResult::new(Some(event_type), Outcome::ComputeFailure(e.to_string()))
            }
            Err(panic) => {
                return DispatchResult::new(
                    Some(event_type),
                    Outcome::ComputeFailure(panic_reason(panic)),
                )
            }
        };

        // The computed result is dropped if persisting fails.
        let persisted = AssertUnwindSafe(handler.persist(payload, &result))
            .catch_unwind()
            .await;
        if let Some(reason) = step_reason(persisted) {
            return DispatchResult::new(Some(event_type), Outcome::PersistFailure(reason));
        }

        debug!(
            event_type = %event_type,
            handler = %handler.name(),
            "Event handled successfully"
        );
        DispatchResult::new(Some(event_type), Outcome::Success(result))
    }
}
