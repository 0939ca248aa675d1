//! Graceful shutdown.
//!
//! A [`ShutdownSignal`] stops the accept loops; a [`ConnectionTracker`] lets
//! the server wait (bounded by the drain timeout) for open connections.
//!
//! ```rust
//! use hubwork_server::shutdown::{ConnectionTracker, ShutdownSignal};
//!
//! let shutdown = ShutdownSignal::new();
//! let tracker = ConnectionTracker::new();
//!
//! let token = tracker.acquire();
//! assert_eq!(tracker.active_connections(), 1);
//! drop(token);
//!
//! shutdown.trigger();
//! assert!(shutdown.is_shutdown());
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

/// Shared, idempotent stop signal. Every clone observes the same trigger.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Creates an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A signal triggered by SIGTERM or SIGINT (Ctrl+C elsewhere).
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn with_os_signals() -> Self {
        let signal = Self::new();
        let trigger = signal.clone();
        tokio::spawn(async move {
            wait_for_os_signal().await;
            trigger.trigger();
        });
        signal
    }

    /// Triggers shutdown.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Whether shutdown was triggered.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once shutdown is triggered, immediately if it already was.
    pub fn recv(&self) -> WaitForCancellationFutureOwned {
        self.token.clone().cancelled_owned()
    }

    /// A token cancelled together with this signal.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}

async fn wait_for_os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                    _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "signal handlers unavailable, waiting for Ctrl+C only");
            }
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received Ctrl+C, shutting down"),
        Err(e) => {
            tracing::error!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

/// Counts open connections.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl ConnectionTracker {
    /// Creates a tracker with no connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection until the token is dropped.
    #[must_use]
    pub fn acquire(&self) -> ConnectionToken {
        self.active.fetch_add(1, Ordering::SeqCst);
        ConnectionToken {
            active: Arc::clone(&self.active),
            notify: Arc::clone(&self.notify),
        }
    }

    /// Number of open connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Waits until no connection is open.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.notify.notified();
            if self.active.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// One open connection.
#[derive(Debug)]
pub struct ConnectionToken {
    active: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl Drop for ConnectionToken {
    fn drop(&mut self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }
}
