//! Prelude module for the mediagrab library
//!
//! This module re-exports the most commonly used items from the library,
//! providing a convenient way to import everything needed for typical usage
//! with a single `use mediagrab::prelude::*;` statement.
//!
//! # Usage
//!
//! ```rust,no_run
//! use mediagrab::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::load(None).await?;
//!     let fetcher = Arc::new(YtDlpFetcher::new(config.to_ytdlp_config()));
//!     let manager = DownloadManager::new(&config, fetcher)?;
//!
//!     manager.submit("https://example.com/watch?v=1", DownloadKind::Video).await?;
//!     manager.wait_until_idle().await;
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, ManagerError, Result};

// Orchestration
pub use crate::app::{
    AggregateStatus, DownloadKind, DownloadManager, EventSubscription, ManagerConfig,
    ManagerConfigBuilder, SettingsProvider,
    // Events
    Outcome, ProgressEvent, ResultEvent, Stage, TaskEvent,
    // Tasks and strategies
    FetchStrategy, FormatSelector, StrategyCascade, TaskId, TaskSnapshot, TaskState,
    // Fetchers
    Fetcher, SimulatedFetcher, YtDlpFetcher,
};

// Configuration
pub use crate::config::AppConfig;

// Commonly used constants
pub use crate::constants::{DEFAULT_MAX_CONCURRENT, DEFAULT_MAX_RETRIES, DEFAULT_STALL_TIMEOUT};

// Standard library re-exports that are commonly needed
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;

pub use tokio;
