//! Event envelopes decoded from queue message bodies.
//!
//! The wire body is a JSON object:
//!
//! ```json
//! {
//!   "eventName": "WastePredictionEvent",
//!   "eventData": { "production_volume": 50000, "month": 6 }
//! }
//! ```
//!
//! Parsing only checks the outer shape. Whatever lives inside `eventData`
//! is the handler's business.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::queue::{QueueMessage, ReceiptToken};

/// Reasons a message body cannot be turned into an [`Envelope`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EnvelopeError {
    #[error("message body is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("message body must be a JSON object")]
    NotAnObject,

    #[error("missing 'eventName' in message payload")]
    MissingEventName,

    #[error("'eventName' must be a non-empty string")]
    InvalidEventName,

    #[error("missing 'eventData' in message payload")]
    MissingEventData,

    #[error("'eventData' must be a JSON object")]
    InvalidEventData,
}

/// Wire representation of an event, as producers publish it.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EventBody {
    #[serde(rename = "eventName")]
    pub event_name: String,

    #[serde(rename = "eventData")]
    pub event_data: Value,
}

impl EventBody {
    pub fn new(event_name: impl Into<String>, event_data: Value) -> Self {
        Self {
            event_name: event_name.into(),
            event_data,
        }
    }
}

/// A decoded unit of work: event type, payload and the receipt used to
/// delete the source message.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Event type used for routing, matched exactly against registry keys
    pub event_type: String,

    /// The `eventData` object
    pub payload: Value,

    /// Identifies the source message for deletion. Never part of the payload.
    pub receipt: ReceiptToken,
}

impl Envelope {
    /// Decode an envelope from a fetched queue message.
    pub fn from_message(message: &QueueMessage) -> Result<Self, EnvelopeError> {
        let (event_type, payload) = parse_body(&message.body)?;
        Ok(Self {
            event_type,
            payload,
            receipt: message.receipt.clone(),
        })
    }
}

/// Parse a raw message body into `(event_type, payload)`.
pub fn parse_body(body: &str) -> Result<(String, Value), EnvelopeError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| EnvelopeError::InvalidJson(e.to_string()))?;

    let Value::Object(mut fields) = value else {
        return Err(EnvelopeError::NotAnObject);
    };

    let event_type = match fields.remove("eventName") {
        None | Some(Value::Null) => return Err(EnvelopeError::MissingEventName),
        Some(Value::String(name)) if !name.is_empty() => name,
        Some(_) => return Err(EnvelopeError::InvalidEventName),
    };

    let payload = match fields.remove("eventData") {
        None | Some(Value::Null) => return Err(EnvelopeError::MissingEventData),
        Some(data @ Value::Object(_)) => data,
        Some(_) => return Err(EnvelopeError::InvalidEventData),
    };

    Ok((event_type, payload))
}
