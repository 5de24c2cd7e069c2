//! Download manager configuration
//!
//! [`ManagerConfig`] is the immutable settings snapshot a manager runs with.
//! It is obtained from a [`SettingsProvider`] once, when the manager is built,
//! and every task copies the parts it needs at creation.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::stall::StallConfig;
use crate::app::strategy::{DownloadKind, FetchStrategy, StrategyTable};
use crate::app::task::TaskConfig;
use crate::constants::manager;
use crate::errors::{ConfigError, ConfigResult};

/// Read-only source of manager settings
pub trait SettingsProvider: Send + Sync {
    /// Current settings snapshot
    fn settings(&self) -> ManagerConfig;
}

/// Settings for a download manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Maximum number of tasks holding a slot at once
    pub max_concurrent: usize,
    /// Directory finished files are written to
    pub output_dir: PathBuf,
    /// Settings copied into every new task
    pub task: TaskConfig,
    /// Strategy lists per download kind
    pub strategies: StrategyTable,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: manager::DEFAULT_MAX_CONCURRENT,
            output_dir: PathBuf::from(manager::DEFAULT_OUTPUT_DIR),
            task: TaskConfig::default(),
            strategies: StrategyTable::default(),
        }
    }
}

impl SettingsProvider for ManagerConfig {
    fn settings(&self) -> ManagerConfig {
        self.clone()
    }
}

impl ManagerConfig {
    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        validate_max_concurrent(self.max_concurrent)?;

        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "output_dir".to_string(),
                value: String::new(),
                reason: "Output directory cannot be empty".to_string(),
            });
        }

        self.task.validate()?;

        self.strategies
            .validate()
            .map_err(|reason| ConfigError::InvalidValue {
                field: "strategies".to_string(),
                value: "table".to_string(),
                reason,
            })
    }
}

/// Check a concurrency cap against the accepted range
pub fn validate_max_concurrent(value: usize) -> ConfigResult<()> {
    if value == 0 || value > manager::MAX_CONCURRENT_LIMIT {
        return Err(ConfigError::InvalidValue {
            field: "max_concurrent".to_string(),
            value: value.to_string(),
            reason: format!(
                "Must be between 1 and {}",
                manager::MAX_CONCURRENT_LIMIT
            ),
        });
    }
    Ok(())
}

/// Builder for ManagerConfig
#[derive(Debug, Default)]
pub struct ManagerConfigBuilder {
    config: ManagerConfig,
}

impl ManagerConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn from_config(config: ManagerConfig) -> Self {
        Self { config }
    }

    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.config.max_concurrent = max;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.task.max_retries = retries;
        self
    }

    pub fn throughput_samples(mut self, samples: usize) -> Self {
        self.config.task.throughput_samples = samples;
        self
    }

    pub fn stall_timeout(mut self, timeout: Duration) -> Self {
        self.config.task.stall.timeout = timeout;
        self
    }

    pub fn stall_check_interval(mut self, interval: Duration) -> Self {
        self.config.task.stall.check_interval = interval;
        self
    }

    pub fn near_zero_bps(mut self, threshold: f64) -> Self {
        self.config.task.stall.near_zero_bps = threshold;
        self
    }

    /// Replace the strategy list for one kind
    pub fn strategies(mut self, kind: DownloadKind, strategies: Vec<FetchStrategy>) -> Self {
        match kind {
            DownloadKind::Video => self.config.strategies.video = strategies,
            DownloadKind::AudioOnly => self.config.strategies.audio_only = strategies,
        }
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> ConfigResult<ManagerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Preset configurations for common scenarios
pub struct ConfigPresets;

impl ConfigPresets {
    /// Production configuration with the documented defaults
    pub fn production() -> ManagerConfig {
        ManagerConfig::default()
    }

    /// Testing configuration with short stall windows
    pub fn testing() -> ManagerConfig {
        ManagerConfig {
            max_concurrent: 2,
            output_dir: std::env::temp_dir().join("mediagrab-test"),
            task: TaskConfig {
                max_retries: 3,
                throughput_samples: 5,
                stall: StallConfig {
                    timeout: Duration::from_secs(2),
                    check_interval: Duration::from_millis(500),
                    near_zero_bps: 1024.0,
                },
            },
            strategies: StrategyTable::default(),
        }
    }
}
