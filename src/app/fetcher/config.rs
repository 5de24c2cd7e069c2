//! yt-dlp adapter configuration
//!
//! Everything the adapter passes to the extractor that is not part of a
//! strategy's format selector lives here.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::ytdlp;
use crate::errors::{ConfigError, ConfigResult};

/// Configuration for the yt-dlp fetcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YtDlpConfig {
    /// Executable name or path
    pub binary: PathBuf,
    /// Socket timeout handed to the extractor
    pub socket_timeout: Duration,
    /// Output template relative to the task's output directory
    pub output_template: String,
    /// ffmpeg location for merging and audio extraction
    pub ffmpeg_location: Option<PathBuf>,
    /// Extra arguments appended before the URL
    pub extra_args: Vec<String>,
}

impl Default for YtDlpConfig {
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

impl YtDlpConfig {
    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        if self.binary.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ytdlp.binary".to_string(),
                value: String::new(),
                reason: "Executable path cannot be empty".to_string(),
            });
        }

        if self.socket_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "ytdlp.socket_timeout".to_string(),
                value: "0s".to_string(),
                reason: "Socket timeout must be greater than zero".to_string(),
            });
        }

        if self.output_template.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ytdlp.output_template".to_string(),
                value: self.output_template.clone(),
                reason: "Output template cannot be empty".to_string(),
            });
        }

        Ok(())
    }
}

/// Builder for YtDlpConfig
#[derive(Debug, Default)]
pub struct YtDlpConfigBuilder {
    config: YtDlpConfig,
}

impl YtDlpConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.config.binary = binary.into();
        self
    }

    pub fn socket_timeout(mut self, timeout: Duration) -> Self {
        self.config.socket_timeout = timeout;
        self
    }

    pub fn output_template(mut self, template: impl Into<String>) -> Self {
        self.config.output_template = template.into();
        self
    }

    pub fn ffmpeg_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ffmpeg_location = Some(path.into());
        self
    }

    pub fn extra_arg(mut self, arg: impl Into<String>) -> Self {
        self.config.extra_args.push(arg.into());
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> ConfigResult<YtDlpConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(YtDlpConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builder_rejects_zero_timeout() {
        let result = YtDlpConfigBuilder::new()
            .socket_timeout(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_builder_sets_fields() {
        let config = YtDlpConfigBuilder::new()
            .binary("/opt/bin/yt-dlp")
            .extra_arg("--cookies-from-browser")
            .extra_arg("firefox")
            .build()
            .unwrap();
        assert_eq!(config.binary, PathBuf::from("/opt/bin/yt-dlp"));
        assert_eq!(config.extra_args.len(), 2);
    }
}
