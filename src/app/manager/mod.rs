//! Download manager with bounded concurrency
//!
//! The manager accepts URLs, keeps at most `max_concurrent` tasks holding a
//! slot, queues the rest in FIFO order and hands freed slots to the head of the
//! queue. Progress and results from every task are fanned out to subscribers.
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mediagrab::app::fetcher::SimulatedFetcher;
//! use mediagrab::app::manager::{ConfigPresets, DownloadManager};
//! use mediagrab::app::progress::TaskEvent;
//! use mediagrab::app::strategy::DownloadKind;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = DownloadManager::new(
//!     &ConfigPresets::production(),
//!     Arc::new(SimulatedFetcher::new()),
//! )?;
//! let mut events = manager.subscribe();
//!
//! manager.submit("https://media.test/watch/1", DownloadKind::Video).await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let TaskEvent::Result(result) = event {
//!         println!("{} finished: {:?}", result.task_id, result.outcome);
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`config`] - Settings snapshot, builder and presets
//! - [`core`] - The manager itself
//! - [`events`] - Event bus and subscriptions
//! - [`state`] - Pending queue, active set and history
//! - [`stats`] - Aggregate status

pub mod config;
pub mod core;
pub mod events;
pub mod state;
pub mod stats;

pub use config::{
    validate_max_concurrent, ConfigPresets, ManagerConfig, ManagerConfigBuilder, SettingsProvider,
};
pub use self::core::{validate_url, DownloadManager};
pub use events::{EventBus, EventSubscription};
pub use state::ManagerState;
pub use stats::AggregateStatus;
