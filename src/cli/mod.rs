//! Command-line interface components
//!
//! This module contains CLI-specific code for the mediagrab application,
//! including argument parsing, command handlers, progress display and signal
//! handling.

pub mod args;
pub mod commands;
pub mod progress;
pub mod signals;

pub use args::{Cli, Commands, ConfigAction, ConfigArgs, DownloadArgs, GlobalArgs, SimulateArgs};
pub use commands::{build_simulation, handle_config, handle_download, handle_simulate};
pub use progress::{ProgressConfig, ProgressDisplay};
pub use signals::{shutdown_on_signal, wait_for_signal};
