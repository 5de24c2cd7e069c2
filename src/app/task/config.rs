//! Per-task settings snapshot
//!
//! A copy of this configuration is captured when a task is created, so later
//! settings changes never affect tasks that already exist.

use serde::{Deserialize, Serialize};

use crate::app::stall::StallConfig;
use crate::constants::task;
use crate::errors::{ConfigError, ConfigResult};

/// Settings every download task runs with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Retry budget shared by stall-triggered and error-triggered retries
    pub max_retries: u32,
    /// Number of throughput samples kept for stall detection
    pub throughput_samples: usize,
    pub stall: StallConfig,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_retries: task::DEFAULT_MAX_RETRIES,
            throughput_samples: task::THROUGHPUT_SAMPLE_WINDOW,
            stall: StallConfig::default(),
        }
    }
}

impl TaskConfig {
    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_retries > task::MAX_RETRIES_LIMIT {
            return Err(ConfigError::InvalidValue {
                field: "task.max_retries".to_string(),
                value: self.max_retries.to_string(),
                reason: format!("Retry budget cannot exceed {}", task::MAX_RETRIES_LIMIT),
            });
        }

        if self.throughput_samples == 0 {
            return Err(ConfigError::InvalidValue {
                field: "task.throughput_samples".to_string(),
                value: "0".to_string(),
                reason: "At least one throughput sample is required".to_string(),
            });
        }

        self.stall.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TaskConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.throughput_samples, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_retries_is_allowed() {
        let config = TaskConfig {
            max_retries: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_window() {
        let config = TaskConfig {
            throughput_samples: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
