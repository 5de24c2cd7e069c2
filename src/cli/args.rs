//! Command-line argument parsing for mediagrab
//!
//! This module defines the CLI structure using clap derive macros: a download
//! command for real URLs, a simulate command that drives the manager against a
//! scripted fetcher, and configuration file management.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::app::strategy::DownloadKind;
use crate::constants::manager::MAX_CONCURRENT_LIMIT;

/// mediagrab - concurrent media downloads with fallback strategies
#[derive(Parser, Debug)]
#[command(
    name = "mediagrab",
    version,
    about = "Download media from many URLs at once with automatic fallback strategies",
    long_about = "Downloads media through yt-dlp with a bounded number of simultaneous downloads.
Each URL is tried with an ordered list of format strategies; failed or stalled attempts
fall through to the next strategy."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download one or more URLs
    Download(DownloadArgs),

    /// Run the manager against simulated downloads
    Simulate(SimulateArgs),

    /// Manage the configuration file
    Config(ConfigArgs),
}

/// Arguments for the download command
#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    /// URLs to download
    #[arg(required = true, value_name = "URL")]
    pub urls: Vec<String>,

    /// Download audio only
    #[arg(short, long)]
    pub audio: bool,

    /// Maximum simultaneous downloads
    #[arg(short = 'j', long, value_name = "N")]
    pub max_concurrent: Option<usize>,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Strategy advances allowed per URL
    #[arg(long, value_name = "N")]
    pub max_retries: Option<u32>,

    /// Time without progress before an attempt is abandoned (e.g. "45s")
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub stall_timeout: Option<Duration>,
}

/// Arguments for the simulate command
#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Number of simulated URLs
    #[arg(short = 'n', long, default_value = "8")]
    pub tasks: usize,

    /// Maximum simultaneous downloads
    #[arg(short = 'j', long, default_value = "3")]
    pub max_concurrent: usize,

    /// Probability that a strategy attempt fails
    #[arg(long, default_value = "0.3")]
    pub failure_rate: f64,

    /// Probability that a strategy attempt stalls
    #[arg(long, default_value = "0.1")]
    pub stall_rate: f64,

    /// Random seed for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Arguments for configuration management
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the logging level based on global arguments
    pub fn log_level(&self) -> tracing::Level {
        if self.global.quiet {
            tracing::Level::ERROR
        } else if self.global.very_verbose {
            tracing::Level::DEBUG
        } else if self.global.verbose {
            tracing::Level::INFO
        } else {
            tracing::Level::WARN
        }
    }
}

impl DownloadArgs {
    /// Validate argument combinations
    pub fn validate(&self) -> Result<(), String> {
        if let Some(max) = self.max_concurrent {
            if max == 0 || max > MAX_CONCURRENT_LIMIT {
                return Err(format!(
                    "--max-concurrent must be between 1 and {}",
                    MAX_CONCURRENT_LIMIT
                ));
            }
        }

        if self.stall_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err("--stall-timeout must be greater than zero".to_string());
        }

        Ok(())
    }

    pub fn kind(&self) -> DownloadKind {
        if self.audio {
            DownloadKind::AudioOnly
        } else {
            DownloadKind::Video
        }
    }
}

impl SimulateArgs {
    /// Validate argument combinations
    pub fn validate(&self) -> Result<(), String> {
        if self.tasks == 0 {
            return Err("--tasks must be greater than 0".to_string());
        }
        if self.max_concurrent == 0 || self.max_concurrent > MAX_CONCURRENT_LIMIT {
            return Err(format!(
                "--max-concurrent must be between 1 and {}",
                MAX_CONCURRENT_LIMIT
            ));
        }
        for (name, rate) in [
            ("--failure-rate", self.failure_rate),
            ("--stall-rate", self.stall_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(format!("{} must be between 0 and 1", name));
            }
        }
        if self.failure_rate + self.stall_rate > 1.0 {
            return Err("--failure-rate and --stall-rate together cannot exceed 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn download_args() -> DownloadArgs {
        DownloadArgs {
            urls: vec!["https://media.test/a".to_string()],
            audio: false,
            max_concurrent: None,
            output: None,
            max_retries: None,
            stall_timeout: None,
        }
    }

    #[test]
    fn test_download_args_validation() {
        let mut args = download_args();
        assert!(args.validate().is_ok());
        assert_eq!(args.kind(), DownloadKind::Video);

        args.max_concurrent = Some(0);
        assert!(args.validate().is_err());

        args.max_concurrent = Some(4);
        args.stall_timeout = Some(Duration::ZERO);
        assert!(args.validate().is_err());

        args.stall_timeout = None;
        args.audio = true;
        assert_eq!(args.kind(), DownloadKind::AudioOnly);
    }

    #[test]
    fn test_parse_download_command() {
        let cli = Cli::try_parse_from([
            "mediagrab",
            "-v",
            "download",
            "--audio",
            "-j",
            "2",
            "--stall-timeout",
            "1m 30s",
            "https://media.test/a",
            "https://media.test/b",
        ])
        .unwrap();

        match cli.command {
            Commands::Download(args) => {
                assert_eq!(args.urls.len(), 2);
                assert!(args.audio);
                assert_eq!(args.max_concurrent, Some(2));
                assert_eq!(args.stall_timeout, Some(Duration::from_secs(90)));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(cli.global.verbose);
    }

    #[test]
    fn test_download_requires_urls() {
        assert!(Cli::try_parse_from(["mediagrab", "download"]).is_err());
    }

    #[test]
    fn test_simulate_args_validation() {
        let mut args = SimulateArgs {
            tasks: 4,
            max_concurrent: 2,
            failure_rate: 0.2,
            stall_rate: 0.1,
            seed: None,
        };
        assert!(args.validate().is_ok());

        args.failure_rate = 0.95;
        assert!(args.validate().is_err());

        args.failure_rate = -0.1;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let cli_quiet = Cli::try_parse_from(["mediagrab", "-q", "config", "show"]).unwrap();
        let cli_debug = Cli::try_parse_from(["mediagrab", "--very-verbose", "config", "show"]).unwrap();

        assert_eq!(cli_quiet.log_level(), tracing::Level::ERROR);
        assert_eq!(cli_debug.log_level(), tracing::Level::DEBUG);
    }
}
