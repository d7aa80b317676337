//! Graceful shutdown.
//!
//! [`ShutdownSignal`] fans a single stop request out to the accept loop and
//! every connection task. [`ConnectionTracker`] counts live connections so the
//! server can wait for them to drain before it reports that it stopped.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Notify};

/// A cloneable stop request shared by the server and its connections.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    /// Holds `true` once shutdown has been triggered
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    /// Creates a new, untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Triggers the signal. Idempotent.
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    /// Returns `true` once the signal has been triggered.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }

    /// Returns a future that completes when the signal is triggered.
    ///
    /// Completes immediately if it already was.
    pub fn recv(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut receiver = self.sender.subscribe();
        async move {
            // Err means every sender is gone, so nothing can trigger any more.
            let _ = receiver.wait_for(|triggered| *triggered).await;
        }
    }

    /// Creates a signal triggered by SIGINT or SIGTERM (Ctrl+C elsewhere).
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn with_os_signals() -> Self {
        let signal = Self::new();
        let signal_clone = signal.clone();

        tokio::spawn(async move {
            wait_for_os_signal().await;
            signal_clone.trigger();
        });

        signal
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_os_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "failed to register signal handlers, falling back to Ctrl+C");
                wait_for_ctrl_c().await;
                return;
            }
        };

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_os_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(e) => {
            // Without a signal source the server runs until killed.
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
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
    /// Creates a tracker with no open connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection; it stays open until the token is dropped.
    #[must_use]
    pub fn acquire(&self) -> ConnectionToken {
        self.active.fetch_add(1, Ordering::SeqCst);
        ConnectionToken {
            active: Arc::clone(&self.active),
            notify: Arc::clone(&self.notify),
        }
    }

    /// Returns the number of open connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Waits until every token has been dropped.
    pub async fn wait_for_drain(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.active.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Token held by a connection task for its lifetime.
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
