//! mediagrab library
//!
//! A download orchestration engine: every submitted URL is driven through a
//! probe and an ordered cascade of fetch strategies, with a global cap on
//! simultaneous downloads, per-task pause, resume and cancellation, stall
//! detection and aggregated progress.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};

#[cfg(test)]
mod tests {
    use super::*;
    use constants::*;

    #[test]
    fn test_constants_accessible() {
        assert_eq!(DEFAULT_MAX_CONCURRENT, 3);
        assert_eq!(DEFAULT_MAX_RETRIES, 3);
        assert!(NEAR_ZERO_THROUGHPUT_BPS > 0.0);
    }

    #[test]
    fn test_error_types() {
        let config_error = errors::ConfigError::NoConfigDir;
        let app_error = AppError::Config(config_error);

        assert_eq!(app_error.category(), "config");
        assert!(!app_error.is_recoverable());
    }
}
