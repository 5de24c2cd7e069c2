//! Download tasks
//!
//! A download task wraps one URL's lifecycle: it owns a control inbox (a
//! cancellation token and a pause gate), a retry counter, the active strategy
//! index and a throughput ring buffer. It publishes progress events while it
//! runs and produces exactly one terminal outcome.
//!
//! # Lifecycle
//!
//! ```text
//! Queued ──start──▶ Running ◀──pause/resume──▶ Paused
//!    │                 │                          │
//!    └──cancel──▶ Cancelled ◀──────cancel─────────┘
//!                      │
//!                      └──▶ Succeeded | Failed
//! ```
//!
//! # Module Organization
//!
//! - [`types`] - Identifiers, states and snapshots
//! - [`config`] - Settings snapshot captured at creation
//! - [`control`] - Cancellation token and pause gate
//! - [`throughput`] - Throughput window and published vitals
//! - [`core`] - The state machine and strategy cascade

pub mod config;
pub mod control;
pub mod core;
pub mod throughput;
pub mod types;

pub use config::TaskConfig;
pub use control::{PauseGate, TaskControl};
pub use self::core::{CancelEffect, DownloadTask};
pub use throughput::{estimate_eta, SampleTracker, TaskVitals, ThroughputWindow};
pub use types::{TaskId, TaskSnapshot, TaskState};
