//! Core application logic for mediagrab
//!
//! This module contains the download orchestration engine: fetcher adapters,
//! strategy cascades, the per-task state machine, stall detection and the
//! bounded-concurrency manager that ties them together.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mediagrab::app::{DownloadKind, DownloadManager, ManagerConfigBuilder, YtDlpConfig, YtDlpFetcher};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ManagerConfigBuilder::new().max_concurrent(2).build()?;
//! let fetcher = Arc::new(YtDlpFetcher::new(YtDlpConfig::default()));
//! let manager = DownloadManager::with_config(config, fetcher)?;
//!
//! let id = manager.submit("https://example.com/watch?v=1", DownloadKind::AudioOnly).await?;
//! manager.wait_until_idle().await;
//! println!("{:?}", manager.snapshot(id).await?.result_path);
//! # Ok(())
//! # }
//! ```

pub mod fetcher;
pub mod manager;
pub mod progress;
pub mod stall;
pub mod strategy;
pub mod task;

// Re-export main public API
pub use fetcher::{
    Behavior, FetchContext, FetchSample, Fetcher, MediaMetadata, SimulatedFetcher, YtDlpConfig,
    YtDlpConfigBuilder, YtDlpFetcher,
};
pub use manager::{
    AggregateStatus, ConfigPresets, DownloadManager, EventSubscription, ManagerConfig,
    ManagerConfigBuilder, SettingsProvider,
};
pub use progress::{Outcome, ProgressEvent, ResultEvent, Stage, TaskEvent};
pub use stall::{StallConfig, StallMonitor, StallNotice};
pub use strategy::{DownloadKind, FetchStrategy, FormatSelector, StrategyCascade, StrategyTable};
pub use task::{DownloadTask, TaskConfig, TaskId, TaskSnapshot, TaskState};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_structure() {
        // Ensure public API is accessible
        let config = ManagerConfig::default();
        assert_eq!(config.max_concurrent, 3);
        assert_eq!(DownloadKind::default(), DownloadKind::Video);
    }
}
