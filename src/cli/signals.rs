//! Signal handling for graceful shutdown
//!
//! Ctrl+C or SIGTERM stops the download manager: queued tasks are cancelled on
//! the spot and running ones are signalled, so every task still reports exactly
//! one result before the process exits.

use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::app::manager::DownloadManager;

/// Wait for Ctrl+C or SIGTERM
///
/// A handler that cannot be installed never fires.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Ctrl+C signal received"),
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("SIGTERM signal received");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Shut the manager down when a signal arrives
///
/// Abort the returned handle once the session ends normally.
pub fn shutdown_on_signal(manager: DownloadManager) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Initiating shutdown, cancelling downloads");
        eprintln!("\nCancelling downloads...");
        manager.shutdown().await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::fetcher::SimulatedFetcher;
    use crate::app::manager::ManagerConfigBuilder;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Test signal watcher setup
    ///
    /// Ensures the watcher can be installed and aborted without shutting the
    /// manager down.
    #[tokio::test]
    async fn test_signal_watcher_can_be_aborted() {
        let dir = TempDir::new().unwrap();
        let config = ManagerConfigBuilder::new()
            .output_dir(dir.path())
            .build()
            .unwrap();
        let manager =
            DownloadManager::with_config(config, Arc::new(SimulatedFetcher::new())).unwrap();

        let handle = shutdown_on_signal(manager.clone());
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.abort();

        assert!(handle.await.unwrap_err().is_cancelled());
        assert!(manager
            .submit("https://media.test/a", crate::app::strategy::DownloadKind::Video)
            .await
            .is_ok());
        manager.shutdown().await;
    }
}
