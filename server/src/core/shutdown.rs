//! Centralized shutdown management

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use super::constants::SHUTDOWN_TIMEOUT_SECS;
use crate::data::topics::TopicService;
use crate::domain::views::DriverStats;

/// Centralized shutdown service for coordinating graceful shutdown
#[derive(Clone)]
pub struct ShutdownService {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
    drivers: Arc<Mutex<Vec<JoinHandle<DriverStats>>>>,
    topics: Arc<TopicService>,
    timeout: Duration,
}

impl ShutdownService {
    pub fn new(topics: Arc<TopicService>) -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
            drivers: Arc::new(Mutex::new(Vec::new())),
            topics,
            timeout: Duration::from_secs(SHUTDOWN_TIMEOUT_SECS),
        }
    }

    /// Override the bound on waiting for drivers
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a partition driver to be awaited during shutdown
    pub async fn register(&self, handle: JoinHandle<DriverStats>) {
        self.drivers.lock().await.push(handle);
    }

    /// True once every registered driver has returned (none registered counts as finished)
    pub async fn drivers_finished(&self) -> bool {
        self.drivers.lock().await.iter().all(|h| h.is_finished())
    }

    /// Subscribe to shutdown signal
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

    /// Trigger shutdown, wait for every driver and return their merged stats
    ///
    /// Shutdown order:
    /// 1. Signal drivers to stop fetching
    /// 2. Wait for in-flight records to be routed and committed
    /// 3. Close the topic backend
    pub async fn shutdown(&self) -> DriverStats {
        tracing::debug!("Initiating graceful shutdown...");
        self.trigger();

        let handles = std::mem::take(&mut *self.drivers.lock().await);
        tracing::debug!(count = handles.len(), "Waiting for partition drivers to finish...");

        let mut total = DriverStats::default();
        match tokio::time::timeout(self.timeout, futures::future::join_all(handles)).await {
            Ok(results) => {
                for result in results {
                    match result {
                        Ok(stats) => total.merge(&stats),
                        Err(e) => tracing::warn!(error = %e, "Partition driver task failed"),
                    }
                }
                tracing::debug!("All partition drivers completed");
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.timeout.as_secs(),
                    "Timeout waiting for partition drivers"
                );
            }
        }

        // Close topics AFTER drivers have committed their last record
        tracing::debug!("Closing topic backend...");
        self.topics.shutdown();

        tracing::debug!("Shutdown complete");
        total
    }

    /// Wait for shutdown signal
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
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut signal) => {
                        signal.recv().await;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to install SIGTERM handler");
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
                _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
            }

            service.trigger();
        });
    }
}
