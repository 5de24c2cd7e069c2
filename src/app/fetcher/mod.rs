//! Fetcher adapters
//!
//! Download tasks reach the media extraction primitive through the [`Fetcher`]
//! trait. Two adapters ship with the crate:
//!
//! - [`YtDlpFetcher`] runs the `yt-dlp` executable as a child process
//! - [`SimulatedFetcher`] follows a script, for tests and the `simulate` command
//!
//! # Module Organization
//!
//! - [`types`] - The trait, progress samples, metadata and per-attempt context
//! - [`config`] - yt-dlp adapter configuration with validation and builder
//! - [`ytdlp`] - yt-dlp process adapter
//! - [`simulated`] - Scripted adapter

pub mod config;
pub mod simulated;
pub mod types;
pub mod ytdlp;

pub use config::{YtDlpConfig, YtDlpConfigBuilder};
pub use simulated::{AttemptRecord, Behavior, SimulatedFetcher};
pub use types::{FetchContext, FetchSample, Fetcher, MediaMetadata};
pub use ytdlp::YtDlpFetcher;
