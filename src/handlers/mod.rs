//! Handler contract for event types.
//!
//! Every event type is served by a [`Handler`] that runs three steps in
//! order: `validate`, `compute`, `persist`. The dispatcher drives the steps
//! and classifies failures by the step that raised them.
//!
//! ## Built-in Handlers
//!
//! - [`WastePredictionHandler`]: waste prediction via an external model,
//!   results stored in the `waste_predictions` collection
//!
//! ## Creating Custom Handlers
//!
//! ```rust,ignore
//! use event_consumer::{Handler, HandlerError};
//! use async_trait::async_trait;
//! use serde_json::Value;
//!
//! struct EchoHandler;
//!
//! #[async_trait]
//! impl Handler for EchoHandler {
//!     fn name(&self) -> &str {
//!         "echo"
//!     }
//!
//!     async fn compute(&self, payload: &Value) -> Result<Value, HandlerError> {
//!         Ok(payload.clone())
//!     }
//!
//!     async fn persist(&self, _payload: &Value, _result: &Value) -> Result<(), HandlerError> {
//!         Ok(())
//!     }
//! }
//! ```

pub mod waste_prediction;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::predictor::{Predictor, PredictorError};
use crate::registry::{Registry, RegistryError};
use crate::store::{DocumentStore, StoreError};

pub use waste_prediction::WastePredictionHandler;

/// Errors that can occur inside a handler step.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Required fields are absent or have the wrong type
    #[error("{}", describe_invalid_fields(.missing, .invalid))]
    InvalidFields {
        missing: Vec<String>,
        invalid: Vec<String>,
    },

    /// The delegated computation failed
    #[error("prediction failed: {0}")]
    Prediction(#[from] PredictorError),

    /// The store rejected the write
    #[error("store write failed: {0}")]
    Store(#[from] StoreError),

    /// Generic handler failure
    #[error("{0}")]
    Failed(String),
}

fn describe_invalid_fields(missing: &[String], invalid: &[String]) -> String {
    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("missing required fields: {}", missing.join(", ")));
    }
    if !invalid.is_empty() {
        parts.push(format!("invalid fields: {}", invalid.join(", ")));
    }
    parts.join("; ")
}

/// The handler contract.
///
/// Handlers are stateless across invocations. Any store handle they hold is
/// shared with the process and must not be closed by the handler.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Returns the handler name used in logs (e.g., "waste-prediction")
    fn name(&self) -> &str;

    /// Check required fields and types. Runs before `compute`.
    fn validate(&self, _payload: &Value) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Run the business computation for a validated payload.
    async fn compute(&self, payload: &Value) -> Result<Value, HandlerError>;

    /// Store the computed result together with its input.
    async fn persist(&self, payload: &Value, result: &Value) -> Result<(), HandlerError>;
}

/// Build the registry of every handler this consumer serves.
///
/// `aliases` maps extra event names onto already registered ones.
pub fn build_registry(
    store: Arc<dyn DocumentStore>,
    predictor: Arc<dyn Predictor>,
    aliases: &HashMap<String, String>,
) -> Result<Registry, RegistryError> {
    let waste: Arc<dyn Handler> = Arc::new(WastePredictionHandler::new(store, predictor));

    let mut builder = Registry::builder()
        .register(waste_prediction::EVENT_TYPE, waste.clone())
        .register(waste_prediction::LEGACY_EVENT_TYPE, waste);

    let mut sorted: Vec<_> = aliases.iter().collect();
    sorted.sort();
    for (alias, target) in sorted {
        builder = builder.alias(alias, target);
    }

    builder.build()
}
