//! Centralized shutdown management

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::constants::SHUTDOWN_TIMEOUT_SECS;

/// Centralized shutdown service coordinating graceful stop of the HTTP
/// server, the worker fleet and the metrics listener.
#[derive(Clone)]
pub struct ShutdownService {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
    /// First fatal failure reason, if any task gave up
    failure: Arc<Mutex<Option<String>>>,
}

impl Default for ShutdownService {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownService {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
            handles: Arc::new(Mutex::new(Vec::new())),
            failure: Arc::new(Mutex::new(None)),
        }
    }

    /// Register a background task handle to be awaited during shutdown
    pub fn register(&self, handle: JoinHandle<()>) {
        self.handles.lock().push(handle);
    }

    /// Subscribe to the shutdown signal
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }

    /// Trigger shutdown
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// Check if shutdown was triggered
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Record a fatal failure and trigger shutdown. The first reason wins and
    /// is reported as the process exit error.
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut failure = self.failure.lock();
        if failure.is_none() {
            *failure = Some(reason);
        }
        drop(failure);
        self.trigger();
    }

    /// The recorded fatal failure reason, if any
    pub fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }

    /// Trigger shutdown and wait for all registered tasks to complete
    pub async fn shutdown(&self) {
        tracing::debug!("Initiating graceful shutdown...");
        self.trigger();

        let handles = std::mem::take(&mut *self.handles.lock());
        let task_count = handles.len();
        tracing::debug!(count = task_count, "Waiting for background tasks to finish...");

        let timeout = Duration::from_secs(SHUTDOWN_TIMEOUT_SECS);
        match tokio::time::timeout(timeout, futures::future::join_all(handles)).await {
            Ok(_) => tracing::debug!("All background tasks completed"),
            Err(_) => tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "Timeout waiting for background tasks"
            ),
        }

        tracing::debug!("Shutdown complete");
    }

    /// Wait for the shutdown signal (for axum graceful shutdown)
    pub fn wait(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.rx.clone();
        async move {
            let _ = rx.wait_for(|&v| v).await;
        }
    }

    /// Install OS signal handlers and auto-trigger on Ctrl+C/SIGTERM
    pub fn install_signal_handlers(&self) {
        let service = self.clone();
        tokio::spawn(async move {
            let ctrl_c = async {
                tokio::signal::ctrl_c()
                    .await
                    .expect("Failed to install Ctrl+C handler");
            };

            #[cfg(unix)]
            let terminate = async {
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to install SIGTERM handler")
                    .recv()
                    .await;
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => tracing::debug!("Received Ctrl+C, shutting down"),
                _ = terminate => tracing::debug!("Received SIGTERM, shutting down"),
            }

            service.trigger();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_not_triggered_initially() {
        let shutdown = ShutdownService::new();
        assert!(!shutdown.is_triggered());
        assert!(shutdown.failure().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_trigger() {
        let shutdown = ShutdownService::new();
        shutdown.trigger();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_fail_records_first_reason() {
        let shutdown = ShutdownService::new();
        shutdown.fail("broker unreachable");
        shutdown.fail("second reason");
        assert!(shutdown.is_triggered());
        assert_eq!(shutdown.failure().as_deref(), Some("broker unreachable"));
    }

    #[tokio::test]
    async fn test_shutdown_wait_returns_after_trigger() {
        let shutdown = ShutdownService::new();
        let wait_future = shutdown.wait();

        let handle = tokio::spawn(wait_future);
        tokio::task::yield_now().await;
        shutdown.trigger();

        tokio::time::timeout(Duration::from_millis(100), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_subscriber_receives_shutdown() {
        let shutdown = ShutdownService::new();
        let rx = shutdown.subscribe();

        assert!(!*rx.borrow());
        shutdown.trigger();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn test_registered_tasks_are_awaited() {
        let shutdown = ShutdownService::new();
        let mut rx = shutdown.subscribe();
        shutdown.register(tokio::spawn(async move {
            let _ = rx.wait_for(|&v| v).await;
        }));
        shutdown.shutdown().await;
    }
}
