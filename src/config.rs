//! Configuration management for mediagrab
//!
//! This module provides the TOML-backed [`AppConfig`] with automatic first-run
//! initialization, file discovery and conversion into the runtime
//! configurations used by the download manager and the yt-dlp adapter.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::fetcher::YtDlpConfig;
use crate::app::manager::{ManagerConfig, SettingsProvider};
use crate::app::stall::StallConfig;
use crate::app::strategy::StrategyTable;
use crate::app::task::TaskConfig;
use crate::constants::{config, manager, stall, task, ytdlp};
use crate::errors::{ConfigError, ConfigResult};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Download manager settings
    pub manager: ManagerConfigToml,
    /// Stall detection settings
    pub stall: StallConfigToml,
    /// yt-dlp adapter settings
    pub ytdlp: YtDlpConfigToml,
    /// Strategy lists per download kind
    pub strategies: StrategyTable,
}

/// TOML-friendly manager configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfigToml {
    /// Maximum number of simultaneous downloads
    pub max_concurrent: usize,
    /// Directory finished files are written to
    pub output_dir: PathBuf,
    /// Strategy advances allowed per task
    pub max_retries: u32,
    /// Throughput samples kept per task
    pub throughput_samples: usize,
}

impl Default for ManagerConfigToml {
    fn default() -> Self {
        Self {
            max_concurrent: manager::DEFAULT_MAX_CONCURRENT,
            output_dir: PathBuf::from(manager::DEFAULT_OUTPUT_DIR),
            max_retries: task::DEFAULT_MAX_RETRIES,
            throughput_samples: task::THROUGHPUT_SAMPLE_WINDOW,
        }
    }
}

/// TOML-friendly stall configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StallConfigToml {
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,
    pub near_zero_bps: f64,
}

impl Default for StallConfigToml {
    fn default() -> Self {
        Self {
            timeout: stall::DEFAULT_STALL_TIMEOUT,
            check_interval: stall::STALL_CHECK_INTERVAL,
            near_zero_bps: stall::NEAR_ZERO_THROUGHPUT_BPS,
        }
    }
}

/// TOML-friendly yt-dlp configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YtDlpConfigToml {
    pub binary: PathBuf,
    #[serde(with = "humantime_serde")]
    pub socket_timeout: Duration,
    pub output_template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffmpeg_location: Option<PathBuf>,
    pub extra_args: Vec<String>,
}

impl Default for YtDlpConfigToml {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(ytdlp::DEFAULT_BINARY),
            socket_timeout: ytdlp::DEFAULT_SOCKET_TIMEOUT,
            output_template: ytdlp::OUTPUT_TEMPLATE.to_string(),
            ffmpeg_location: None,
            extra_args: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Runtime configuration for the download manager
    pub fn to_manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            max_concurrent: self.manager.max_concurrent,
            output_dir: self.manager.output_dir.clone(),
            task: TaskConfig {
                max_retries: self.manager.max_retries,
                throughput_samples: self.manager.throughput_samples,
                stall: StallConfig {
                    timeout: self.stall.timeout,
                    check_interval: self.stall.check_interval,
                    near_zero_bps: self.stall.near_zero_bps,
                },
            },
            strategies: self.strategies.clone(),
        }
    }

    /// Runtime configuration for the yt-dlp adapter
    pub fn to_ytdlp_config(&self) -> YtDlpConfig {
        YtDlpConfig {
            binary: self.ytdlp.binary.clone(),
            socket_timeout: self.ytdlp.socket_timeout,
            output_template: self.ytdlp.output_template.clone(),
            ffmpeg_location: self.ytdlp.ffmpeg_location.clone(),
            extra_args: self.ytdlp.extra_args.clone(),
        }
    }

    /// Validate both runtime configurations, collecting every problem
    pub fn validate(&self) -> ConfigResult<()> {
        let errors: Vec<String> = [
            self.to_manager_config().validate(),
            self.to_ytdlp_config().validate(),
        ]
        .into_iter()
        .filter_map(|result| result.err().map(|e| e.to_string()))
        .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationFailed { errors })
        }
    }

    /// Load configuration
    ///
    /// An explicit path must exist. Without one the standard locations are
    /// searched and defaults are used when nothing is found.
    pub async fn load(config_file_override: Option<PathBuf>) -> ConfigResult<Self> {
        let config_path = match config_file_override {
            Some(path) if path.exists() => Some(path),
            Some(path) => return Err(ConfigError::NotFound { path }),
            None => Self::find_config_file(),
        };

        match config_path {
            Some(path) => Self::load_from_file(&path).await,
            None => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Create a default config file if none exists
    ///
    /// Returns the path of the new file, or `None` when one already existed.
    pub async fn initialize_first_run() -> ConfigResult<Option<PathBuf>> {
        let config_path = Self::get_default_config_path()?;
        if config_path.exists() {
            return Ok(None);
        }

        info!("Creating default configuration file...");
        Self::write_default(&config_path).await?;
        Ok(Some(config_path))
    }

    /// Write the commented default configuration to a path
    pub async fn write_default(path: &Path) -> ConfigResult<()> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        tokio::fs::write(path, Self::generate_default_config_content())
            .await
            .map_err(io_error)?;

        info!("Wrote default configuration to {}", path.display());
        Ok(())
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from(config::LOCAL_CONFIG_FILE)];
        if let Ok(user_config) = Self::get_default_config_path() {
            search_paths.push(user_config);
        }

        let found = search_paths.into_iter().find(|path| path.exists());
        if let Some(path) = &found {
            debug!("Found config file: {}", path.display());
        }
        found
    }

    /// Default config file path for the current user
    pub fn get_default_config_path() -> ConfigResult<PathBuf> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir
            .join(config::APP_DIR_NAME)
            .join(config::CONFIG_FILE_NAME))
    }

    async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let config: AppConfig = toml::from_str(&content)?;
        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Default configuration content with comments
    pub fn generate_default_config_content() -> String {
        format!(
            r#"# mediagrab configuration
# Durations accept humantime values such as "30s", "2m" or "1h 30m".

[manager]
# Maximum number of simultaneous downloads
max_concurrent = {max_concurrent}
# Directory finished files are written to
output_dir = "{output_dir}"
# Strategy advances allowed per task (stalls and failures share this budget)
max_retries = {max_retries}
# Throughput samples kept per task for stall detection
throughput_samples = {samples}

[stall]
# Time without progress before an attempt counts as stalled
timeout = "{timeout}"
# How often running downloads are checked
check_interval = "{interval}"
# Average bytes/sec below which a download counts as idle
near_zero_bps = {near_zero:.1}

[ytdlp]
binary = "{binary}"
socket_timeout = "{socket_timeout}"
output_template = "{template}"
# ffmpeg_location = "/usr/bin/ffmpeg"
extra_args = []

# Strategy lists default to the built-in cascades. To override one, list
# every strategy for that kind in order, for example:
#
# [[strategies.audio_only]]
# name = "opus"
# format = "ba"
# audio_format = "opus"
# priority = 0
"#,
            max_concurrent = manager::DEFAULT_MAX_CONCURRENT,
            output_dir = manager::DEFAULT_OUTPUT_DIR,
            max_retries = task::DEFAULT_MAX_RETRIES,
            samples = task::THROUGHPUT_SAMPLE_WINDOW,
            timeout = humantime_serde::re::humantime::format_duration(stall::DEFAULT_STALL_TIMEOUT),
            interval = humantime_serde::re::humantime::format_duration(stall::STALL_CHECK_INTERVAL),
            near_zero = stall::NEAR_ZERO_THROUGHPUT_BPS,
            binary = ytdlp::DEFAULT_BINARY,
            socket_timeout = humantime_serde::re::humantime::format_duration(ytdlp::DEFAULT_SOCKET_TIMEOUT),
            template = ytdlp::OUTPUT_TEMPLATE,
        )
    }
}

impl SettingsProvider for AppConfig {
    fn settings(&self) -> ManagerConfig {
        self.to_manager_config()
    }
}
