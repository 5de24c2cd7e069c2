//! Error types for mediagrab
//!
//! This module defines the error taxonomy for every layer of the download
//! orchestrator. Fetcher adapters report [`FetchError`], download tasks classify
//! those into [`TaskError`] to drive the strategy cascade, the manager reports
//! command errors through [`ManagerError`], and configuration loading uses
//! [`ConfigError`]. [`AppError`] ties them together for the binary.

use std::path::PathBuf;

use thiserror::Error;

use crate::app::task::{TaskId, TaskState};

/// Errors reported by a fetcher adapter for a single probe or fetch attempt
#[derive(Error, Debug)]
pub enum FetchError {
    /// Metadata could not be retrieved for the URL
    #[error("Metadata probe failed: {reason}")]
    Probe { reason: String },

    /// The attempt failed inside the extractor or on the network
    #[error("Fetch attempt failed: {reason}")]
    Attempt { reason: String },

    /// The extractor gave up waiting on the remote side
    #[error("Fetch timed out: {reason}")]
    Timeout { reason: String },

    /// A fragment of a segmented stream could not be downloaded
    #[error("Fragment download failed: {reason}")]
    Fragment { reason: String },

    /// The attempt finished but no output file could be found
    #[error("Strategy completed but produced no output file")]
    MissingOutput,

    /// The reported output path does not exist on disk
    #[error("Reported output file does not exist: {path}")]
    OutputNotFound { path: PathBuf },

    /// The attempt observed its cancellation signal
    #[error("Fetch cancelled")]
    Cancelled,

    /// The extractor executable could not be started
    #[error("Failed to launch extractor '{binary}': {source}")]
    Launch {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error while talking to the extractor process or the file system
    #[error("Fetcher I/O error")]
    Io(#[from] std::io::Error),

    /// Metadata returned by the extractor could not be parsed
    #[error("Could not parse extractor metadata")]
    Metadata(#[from] serde_json::Error),
}

impl FetchError {
    /// Create an attempt failure with a message
    pub fn attempt(reason: impl Into<String>) -> Self {
        Self::Attempt {
            reason: reason.into(),
        }
    }

    /// Create a probe failure with a message
    pub fn probe(reason: impl Into<String>) -> Self {
        Self::Probe {
            reason: reason.into(),
        }
    }

    /// Check if the error is transient (another strategy may succeed)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Timeout { .. } | FetchError::Fragment { .. } | FetchError::Io(_)
        )
    }
}

/// Errors produced while a download task runs its strategy cascade
///
/// Only [`TaskError::Exhausted`], [`TaskError::Probe`] and
/// [`TaskError::Cancelled`] ever reach the caller as a terminal outcome.
/// Strategy and stall errors are consumed by the cascade.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Metadata could not be retrieved, nothing to cascade from
    #[error("Could not retrieve media information: {reason}")]
    Probe { reason: String },

    /// A specific strategy attempt failed
    #[error("Strategy '{strategy}' failed: {reason}")]
    Strategy { strategy: String, reason: String },

    /// The stall monitor gave up on the current strategy
    #[error("Strategy '{strategy}' stalled with no progress for {stalled_secs} seconds")]
    Stall { strategy: String, stalled_secs: u64 },

    /// Every strategy was tried or the retry budget is spent
    #[error("All download strategies failed after {attempts} attempts. Last error: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    /// Cancelled by the user
    #[error("Download cancelled")]
    Cancelled,

    /// A lifecycle command was issued in a state that does not support it
    #[error("Cannot {operation} task {task_id} while it is {state}")]
    InvalidTransition {
        task_id: TaskId,
        state: TaskState,
        operation: &'static str,
    },
}

impl TaskError {
    /// Check if this error moves the task to its next strategy
    pub fn advances_cascade(&self) -> bool {
        matches!(self, TaskError::Strategy { .. } | TaskError::Stall { .. })
    }
}

/// Errors returned by download manager commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManagerError {
    /// No task with this identifier was ever submitted
    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: TaskId },

    /// The task exists but cannot perform the requested transition
    #[error("Cannot {operation} task {task_id} while it is {state}")]
    InvalidTransition {
        task_id: TaskId,
        state: TaskState,
        operation: &'static str,
    },

    /// Submitted URL could not be parsed or uses an unsupported scheme
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Concurrency cap must be positive
    #[error("Invalid concurrency limit {value}: must be between 1 and {max}")]
    InvalidConcurrency { value: usize, max: usize },

    /// No strategies configured for the requested cascade
    #[error("No download strategies configured for {kind}")]
    EmptyCascade { kind: String },

    /// The manager is shutting down and no longer accepts work
    #[error("Download manager is shutting down")]
    ShuttingDown,
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// Configuration validation failed
    #[error("Configuration validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<String> },

    /// Could not determine where configuration lives
    #[error("Could not determine user config directory")]
    NoConfigDir,

    /// I/O error reading or writing configuration
    #[error("Configuration file I/O error: {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Fetcher adapter error
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Download task error
    #[error(transparent)]
    Task(#[from] TaskError),

    /// Download manager error
    #[error(transparent)]
    Manager(#[from] ManagerError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Fetch(e) => e.is_transient(),
            AppError::Task(e) => e.advances_cascade(),
            AppError::Manager(ManagerError::InvalidTransition { .. }) => true,
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Fetch(_) => "fetch",
            AppError::Task(_) => "task",
            AppError::Manager(_) => "manager",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Fetcher result type alias
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Task result type alias
pub type TaskResult<T> = std::result::Result<T, TaskError>;

/// Manager result type alias
pub type ManagerResult<T> = std::result::Result<T, ManagerError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cascade_classification() {
        let strategy = TaskError::Strategy {
            strategy: "best".to_string(),
            reason: "HTTP 403".to_string(),
        };
        let stall = TaskError::Stall {
            strategy: "best".to_string(),
            stalled_secs: 30,
        };

        assert!(strategy.advances_cascade());
        assert!(stall.advances_cascade());
        assert!(!TaskError::Cancelled.advances_cascade());
        assert!(!TaskError::Probe {
            reason: "unsupported".to_string()
        }
        .advances_cascade());
    }

    #[test]
    fn test_transient_fetch_errors() {
        assert!(FetchError::Timeout {
            reason: "read".to_string()
        }
        .is_transient());
        assert!(!FetchError::MissingOutput.is_transient());
        assert!(!FetchError::Cancelled.is_transient());
    }

    #[test]
    fn test_app_error_category() {
        let error = AppError::Manager(ManagerError::TaskNotFound {
            task_id: TaskId::new(7),
        });
        assert_eq!(error.category(), "manager");
        assert!(!error.is_recoverable());
        assert_eq!(error.to_string(), "Task not found: #7");
    }

    #[test]
    fn test_exhausted_message_includes_last_error() {
        let error = TaskError::Exhausted {
            attempts: 3,
            last_error: "Strategy 'worst' failed: 404".to_string(),
        };
        assert!(error.to_string().contains("3 attempts"));
        assert!(error.to_string().contains("404"));
    }
}
