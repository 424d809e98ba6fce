//! Graceful shutdown
//!
//! ## Features
//!
//! - SIGINT (Ctrl+C) handling
//! - SIGTERM handling (Unix only)
//! - Manual trigger through [`ShutdownHandle`]
//! - Bounded drain of in-flight requests
//!
//! ## Usage
//!
//! ```ignore
//! use gatehouse_server::shutdown::{shutdown_signal, GracefulShutdown, ShutdownHandle};
//!
//! let handle = ShutdownHandle::new();
//! let trigger = handle.clone();
//! tokio::spawn(async move {
//!     let signal = shutdown_signal().await;
//!     trigger.trigger(signal);
//! });
//!
//! let mut waiter = handle.clone();
//! let serving = server.serve(listener, async move {
//!     waiter.wait().await;
//! });
//! GracefulShutdown::with_timeout(timeout).drain(handle, serving).await?;
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

/// How long in-flight requests may run after shutdown begins
#[derive(Debug, Clone)]
pub struct GracefulShutdown {
    pub timeout: Duration,
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self {
            timeout: crate::config::DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// Result of [`GracefulShutdown::drain`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The server finished on its own
    Completed,
    /// The drain timeout expired with requests still running
    TimedOut,
}

impl GracefulShutdown {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Drive `serving` to completion, but once `handle` is signaled give it
    /// at most `timeout` to finish.
    ///
    /// Long-lived heartbeat streams never end on their own, so the timeout
    /// is what actually bounds shutdown when agents stay connected.
    pub async fn drain<F, T>(
        &self,
        mut handle: ShutdownHandle,
        serving: F,
    ) -> (DrainOutcome, Option<T>)
    where
        F: Future<Output = T>,
    {
        let mut serving = std::pin::pin!(serving);

        tokio::select! {
            output = &mut serving => return (DrainOutcome::Completed, Some(output)),
            signal = handle.wait() => {
                tracing::info!(
                    %signal,
                    timeout = ?self.timeout,
                    "Shutdown requested, draining connections"
                );
            }
        }

        match tokio::time::timeout(self.timeout, serving).await {
            Ok(output) => (DrainOutcome::Completed, Some(output)),
            Err(_) => {
                tracing::warn!(
                    timeout = ?self.timeout,
                    "Drain timeout expired, dropping open connections"
                );
                (DrainOutcome::TimedOut, None)
            }
        }
    }
}

/// Shutdown signal type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Received SIGINT (Ctrl+C)
    SigInt,
    /// Received SIGTERM
    SigTerm,
    /// Manual shutdown requested
    Manual,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SigInt => write!(f, "SIGINT (Ctrl+C)"),
            Self::SigTerm => write!(f, "SIGTERM"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Handle for triggering and monitoring shutdown
#[derive(Clone)]
pub struct ShutdownHandle {
    sender: watch::Sender<Option<ShutdownSignal>>,
    receiver: watch::Receiver<Option<ShutdownSignal>>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(None);
        Self { sender, receiver }
    }

    /// Trigger a manual shutdown
    pub fn shutdown(&self) {
        self.trigger(ShutdownSignal::Manual);
    }

    /// Record `signal` as the shutdown cause. Only the first call wins.
    pub fn trigger(&self, signal: ShutdownSignal) {
        self.sender.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(signal);
                true
            } else {
                false
            }
        });
    }

    /// Wait for shutdown signal
    pub async fn wait(&mut self) -> ShutdownSignal {
        loop {
            if let Some(signal) = *self.receiver.borrow() {
                return signal;
            }
            if self.receiver.changed().await.is_err() {
                return ShutdownSignal::Manual;
            }
        }
    }

    /// Check if shutdown has been signaled
    pub fn is_shutdown(&self) -> bool {
        self.receiver.borrow().is_some()
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Completes when SIGINT or SIGTERM arrives.
///
/// If a handler cannot be installed the corresponding branch never fires;
/// the failure is logged instead of aborting the server.
pub async fn shutdown_signal() -> ShutdownSignal {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => ShutdownSignal::SigInt,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                ShutdownSignal::SigTerm
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<ShutdownSignal>();

    tokio::select! {
        signal = ctrl_c => signal,
        signal = terminate => signal,
    }
}
