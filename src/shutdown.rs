//! Graceful shutdown coordination.
//!
//! [`ShutdownSignal`] is a write-once stop flag shared between the poller and
//! whatever requests the stop (a signal listener, a test, an admin hook).
//! The poller checks [`should_stop`](ShutdownSignal::should_stop) at the top
//! of every fetch cycle and after every batch; it never cancels work that is
//! already in flight.
//!
//! # Example
//!
//! ```rust,ignore
//! use event_consumer::shutdown::ShutdownSignal;
//!
//! let shutdown = ShutdownSignal::new();
//!
//! // Map SIGINT / SIGTERM onto request_stop()
//! let listener = shutdown.clone();
//! tokio::spawn(async move { listener.listen_for_signals().await });
//!
//! while !shutdown.should_stop() {
//!     // fetch and process one batch
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, error, info};

struct Inner {
    requested: AtomicBool,
    notify: Notify,
}

/// A process-wide, set-once stop flag.
///
/// Clones share the same flag.
#[derive(Clone)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                requested: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Request a stop.
    ///
    /// Idempotent: returns `true` only for the call that flipped the flag.
    pub fn request_stop(&self) -> bool {
        let first = self
            .inner
            .requested
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();

        if first {
            info!("Stop requested, no new batches will be fetched");
            self.inner.notify.notify_waiters();
        } else {
            debug!("Stop already requested");
        }
        first
    }

    /// Non-blocking check of the stop flag.
    pub fn should_stop(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Resolve once a stop has been requested.
    pub async fn stopped(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent request is not missed.
        notified.as_mut().enable();

        if self.should_stop() {
            return;
        }
        notified.await;
    }

    /// Wait for SIGINT or SIGTERM and turn it into a stop request.
    pub async fn listen_for_signals(&self) {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C, initiating graceful shutdown...");
            }
            _ = terminate => {
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
            _ = self.stopped() => {
                return;
            }
        }

        self.request_stop();
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
