//! # Event Consumer
//!
//! A queue-driven event consumer for FIFO message queues.
//!
//! ## Architecture
//!
//! ```text
//! SQS FIFO -> Poller -> Dispatcher -> Registry -> Handler (validate/compute/persist)
//!                |                                      |
//!                +-- delete / dead-letter <-- Outcome <-+
//! ```
//!
//! ## Modules
//!
//! - [`envelope`]: Wire body parsing into event envelopes
//! - [`handlers`]: Handler contract and the concrete event handlers
//! - [`registry`]: Immutable event-type to handler lookup table
//! - [`dispatcher`]: Envelope to [`Outcome`] classification
//! - [`poller`]: The long-running fetch / dispatch / delete loop
//! - [`shutdown`]: Cooperative stop flag shared with signal handlers
//! - [`queue`], [`dlq`], [`store`], [`predictor`]: external collaborators

pub mod config;
pub mod dispatcher;
pub mod dlq;
pub mod envelope;
pub mod handlers;
pub mod logging;
pub mod poller;
pub mod predictor;
pub mod queue;
pub mod registry;
pub mod shutdown;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types at crate root
pub use dispatcher::{DispatchResult, Dispatcher, Outcome};
pub use envelope::Envelope;
pub use handlers::{Handler, HandlerError};
pub use poller::{Poller, PollerState, PollerStats};
pub use registry::Registry;
pub use shutdown::ShutdownSignal;

/// Logical database namespace that handlers write into.
pub const DEFAULT_DATABASE: &str = "waste_management";

/// Message group used for dead-lettered messages that carry no ordering key.
pub const DEFAULT_DLQ_GROUP: &str = "dlq-group";
