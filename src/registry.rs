//! Handler Registry.
//!
//! The [`Registry`] maps event names to [`Handler`] instances. It is built
//! once at startup from an explicit table and never changes afterwards.
//!
//! # Duplicate keys
//!
//! ```text
//! register("A", h1); register("A", h1)  -> fine, same instance
//! register("A", h1); register("A", h2)  -> RegistryError::DuplicateEventType
//! ```
//!
//! Several keys may point at the same handler instance, which is how legacy
//! event names are kept routable.
//!
//! # Example
//!
//! ```rust,ignore
//! let registry = Registry::builder()
//!     .register("WastePredictionEvent", handler.clone())
//!     .alias("WASTE/PREDICTION", "WastePredictionEvent")
//!     .build()?;
//!
//! let handler = registry.resolve("WastePredictionEvent")?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::handlers::Handler;

/// Errors raised while building or querying the registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("event type '{event_type}' is registered to two different handlers ('{existing}' and '{conflicting}')")]
    DuplicateEventType {
        event_type: String,
        existing: String,
        conflicting: String,
    },

    #[error("alias '{alias}' points at unregistered event type '{target}'")]
    UnknownAliasTarget { alias: String, target: String },

    #[error("event type must not be empty")]
    EmptyEventType,

    #[error("no handler registered for event '{event_type}'")]
    Unroutable { event_type: String },
}

enum Entry {
    Handler(Arc<dyn Handler>),
    Alias(String),
}

/// Collects `(event_type, handler)` pairs; validation happens in [`build`](Self::build).
#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<(String, Entry)>,
}

impl RegistryBuilder {
    /// Register a handler for an exact event name.
    pub fn register(mut self, event_type: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        self.entries
            .push((event_type.into(), Entry::Handler(handler)));
        self
    }

    /// Route `alias` to whatever handler `target` is registered to.
    pub fn alias(mut self, alias: impl Into<String>, target: impl Into<String>) -> Self {
        self.entries
            .push((alias.into(), Entry::Alias(target.into())));
        self
    }

    pub fn build(self) -> Result<Registry, RegistryError> {
        let mut handlers: HashMap<String, Arc<dyn Handler>> = HashMap::new();
        let mut aliases = Vec::new();

        for (event_type, entry) in self.entries {
            if event_type.is_empty() {
                return Err(RegistryError::EmptyEventType);
            }
            match entry {
                Entry::Handler(handler) => insert_unique(&mut handlers, event_type, handler)?,
                Entry::Alias(target) => aliases.push((event_type, target)),
            }
        }

        // Aliases resolve against direct registrations only.
        let mut resolved = Vec::with_capacity(aliases.len());
        for (alias, target) in aliases {
            let handler = handlers
                .get(&target)
                .cloned()
                .ok_or_else(|| RegistryError::UnknownAliasTarget {
                    alias: alias.clone(),
                    target: target.clone(),
                })?;
            resolved.push((alias, handler));
        }
        for (alias, handler) in resolved {
            insert_unique(&mut handlers, alias, handler)?;
        }

        info!(
            event_types = handlers.len(),
            "Handler registry built"
        );

        Ok(Registry { handlers })
    }
}

fn same_instance(a: &Arc<dyn Handler>, b: &Arc<dyn Handler>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

fn insert_unique(
    handlers: &mut HashMap<String, Arc<dyn Handler>>,
    event_type: String,
    handler: Arc<dyn Handler>,
) -> Result<(), RegistryError> {
    if let Some(existing) = handlers.get(&event_type) {
        if same_instance(existing, &handler) {
            debug!(event_type = %event_type, "Ignoring repeated registration of the same handler");
            return Ok(());
        }
        return Err(RegistryError::DuplicateEventType {
            event_type,
            existing: existing.name().to_string(),
            conflicting: handler.name().to_string(),
        });
    }

    debug!(
        event_type = %event_type,
        handler = %handler.name(),
        "Registering handler"
    );
    handlers.insert(event_type, handler);
    Ok(())
}

/// Immutable event name to handler lookup table.
///
/// Wrap in `Arc` to share across tasks; lookups are read-only.
pub struct Registry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Look up the handler for an event name. Matching is exact and
    /// case-sensitive.
    pub fn resolve(&self, event_type: &str) -> Result<Arc<dyn Handler>, RegistryError> {
        self.handlers
            .get(event_type)
            .cloned()
            .ok_or_else(|| RegistryError::Unroutable {
                event_type: event_type.to_string(),
            })
    }

    /// All routable event names, sorted.
    pub fn event_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(|s| s.as_str()).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
