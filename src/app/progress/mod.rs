//! Progress and result events
//!
//! Download tasks describe what they are doing with [`ProgressEvent`] values and
//! finish with exactly one [`ResultEvent`]. Both travel to subscribers wrapped in
//! a [`TaskEvent`].
//!
//! # Module Organization
//!
//! - [`types`] - Event value types
//! - [`format`] - Throughput, ETA and size formatting helpers

pub mod format;
pub mod types;

pub use format::{format_bytes, format_duration, format_eta, format_rate, percent_of};
pub use types::{Outcome, ProgressEvent, ResultEvent, Stage, TaskEvent};
