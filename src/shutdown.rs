//! Graceful shutdown handling

use tokio::signal;
use tokio::sync::watch;
use tracing::info;

/// Shutdown coordinator
pub struct ShutdownCoordinator {
    sender: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// Get a shutdown notifier
    pub fn subscribe(&self) -> ShutdownNotifier {
        ShutdownNotifier {
            receiver: self.sender.subscribe(),
        }
    }

    /// Wait for Ctrl+C or SIGTERM, then notify every subscriber
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
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
            _ = ctrl_c => {
                info!("Received Ctrl+C signal");
            }
            _ = terminate => {
                info!("Received SIGTERM signal");
            }
        }

        self.shutdown();
    }

    /// Trigger shutdown manually
    pub fn shutdown(&self) {
        info!("Shutdown triggered");
        self.sender.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Shutdown notifier for components
#[derive(Clone)]
pub struct ShutdownNotifier {
    receiver: watch::Receiver<bool>,
}

impl ShutdownNotifier {
    /// Resolve once shutdown has been signaled, including before this call
    pub async fn wait(&mut self) {
        // Err means the coordinator is gone, which is shutdown as well
        let _ = self.receiver.wait_for(|down| *down).await;
    }

    /// Check if shutdown has been signaled (non-blocking)
    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_coordinator() {
        let coordinator = ShutdownCoordinator::new();
        let mut notifier = coordinator.subscribe();

        let handle = tokio::spawn(async move {
            notifier.wait().await;
            true
        });

        coordinator.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("notifier should resolve")
            .unwrap();
        assert!(result);
        assert!(coordinator.is_shutdown());
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_shutdown() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.shutdown();

        let mut notifier = coordinator.subscribe();
        assert!(notifier.is_shutdown());
        tokio::time::timeout(Duration::from_secs(1), notifier.wait())
            .await
            .expect("already shut down");
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let coordinator = ShutdownCoordinator::new();
        let mut notifier1 = coordinator.subscribe();
        let mut notifier2 = coordinator.subscribe();

        let handle1 = tokio::spawn(async move {
            notifier1.wait().await;
            1
        });
        let handle2 = tokio::spawn(async move {
            notifier2.wait().await;
            2
        });

        coordinator.shutdown();

        assert_eq!(handle1.await.unwrap(), 1);
        assert_eq!(handle2.await.unwrap(), 2);
    }
}
