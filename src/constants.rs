//! Application constants for mediagrab
//!
//! This module centralizes the defaults used throughout the download
//! orchestrator, organized by functional domain. Runtime configuration
//! falls back to these values when the settings file leaves a field out.

use std::time::Duration;

/// Download manager defaults
pub mod manager {
    /// Default number of downloads allowed to run at the same time
    pub const DEFAULT_MAX_CONCURRENT: usize = 3;

    /// Upper bound accepted for the concurrency cap
    pub const MAX_CONCURRENT_LIMIT: usize = 32;

    /// Default directory (relative to the working directory) for finished files
    pub const DEFAULT_OUTPUT_DIR: &str = "downloads";

    /// URL schemes accepted by `submit`
    pub const SUPPORTED_SCHEMES: &[&str] = &["http", "https"];
}

/// Download task defaults
pub mod task {
    /// Retry budget shared by stall-triggered and error-triggered retries
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Number of throughput samples kept per task
    pub const THROUGHPUT_SAMPLE_WINDOW: usize = 10;

    /// Upper bound accepted for the retry budget
    pub const MAX_RETRIES_LIMIT: u32 = 20;
}

/// Stall detection defaults
pub mod stall {
    use super::Duration;

    /// Time without forward progress before a running attempt is considered stalled
    pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(30);

    /// Interval between stall monitor evaluations
    pub const STALL_CHECK_INTERVAL: Duration = Duration::from_secs(5);

    /// Average throughput (bytes/sec) below which a download counts as idle
    pub const NEAR_ZERO_THROUGHPUT_BPS: f64 = 1024.0;
}

/// Progress reporting and formatting
pub mod progress {
    /// Minimum percent change before a bar is redrawn in plain log mode
    pub const PLAIN_LOG_PERCENT_STEP: f64 = 10.0;

    /// Placeholder shown when throughput or ETA is not yet known
    pub const UNKNOWN_PLACEHOLDER: &str = "--";

    /// Per-task progress bar template
    pub const TASK_BAR_TEMPLATE: &str =
        "{spinner:.green} {prefix:>4} [{bar:30.cyan/blue}] {pos:>3}% {msg}";

    /// Overall progress bar template
    pub const OVERALL_BAR_TEMPLATE: &str =
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";

    /// Progress bar characters
    pub const BAR_CHARS: &str = "#>-";
}

/// yt-dlp adapter defaults
pub mod ytdlp {
    use super::Duration;

    /// Executable looked up on PATH when no explicit binary is configured
    pub const DEFAULT_BINARY: &str = "yt-dlp";

    /// Socket timeout passed to the extractor
    pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(30);

    /// Output file template relative to the output directory
    pub const OUTPUT_TEMPLATE: &str = "%(title)s [%(id)s].%(ext)s";

    /// Marker prefixing machine-readable progress lines
    pub const PROGRESS_MARKER: &str = "[mediagrab-progress]";

    /// Progress template handed to `--progress-template`
    pub const PROGRESS_TEMPLATE: &str = "download:[mediagrab-progress] %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s %(progress.speed)s";

    /// Maximum number of stderr lines retained for error classification
    pub const STDERR_TAIL_LINES: usize = 20;
}

/// Logging and debugging constants
pub mod logging {
    /// Default log level
    pub const DEFAULT_LOG_LEVEL: &str = "info";

    /// Crate name used for the tracing filter directive
    pub const LOG_TARGET: &str = "mediagrab";
}

/// Configuration file locations
pub mod config {
    /// Configuration file looked up in the working directory
    pub const LOCAL_CONFIG_FILE: &str = "mediagrab.toml";

    /// Application directory name under the user config directory
    pub const APP_DIR_NAME: &str = "mediagrab";

    /// Configuration file name inside the application directory
    pub const CONFIG_FILE_NAME: &str = "config.toml";
}

// Re-export commonly used constants for convenience
pub use manager::{DEFAULT_MAX_CONCURRENT, MAX_CONCURRENT_LIMIT};
pub use stall::{DEFAULT_STALL_TIMEOUT, NEAR_ZERO_THROUGHPUT_BPS, STALL_CHECK_INTERVAL};
pub use task::{DEFAULT_MAX_RETRIES, THROUGHPUT_SAMPLE_WINDOW};
