//! Command handlers for the mediagrab CLI
//!
//! This module implements the command handlers that turn parsed arguments
//! into a configured download manager and drive a session to completion.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::app::fetcher::{Behavior, Fetcher, SimulatedFetcher, YtDlpFetcher};
use crate::app::manager::{
    validate_url, AggregateStatus, ConfigPresets, DownloadManager, ManagerConfig,
    ManagerConfigBuilder,
};
use crate::app::strategy::{DownloadKind, StrategyTable};
use crate::cli::{
    shutdown_on_signal, ConfigAction, ConfigArgs, DownloadArgs, ProgressConfig, ProgressDisplay,
    SimulateArgs,
};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};

/// Handle the download command
///
/// Loads configuration, applies command line overrides and downloads every
/// valid URL through yt-dlp.
pub async fn handle_download(args: DownloadArgs, config_path: Option<PathBuf>) -> Result<()> {
    args.validate().map_err(AppError::generic)?;

    if config_path.is_none() {
        if let Some(created) = AppConfig::initialize_first_run().await? {
            println!("Created default configuration file:");
            println!("   {}", created.display());
            println!("   You can customize settings by editing this file.");
            println!();
        }
    }

    let app_config = AppConfig::load(config_path).await?;
    let manager_config = apply_overrides(app_config.to_manager_config(), &args)?;

    let ytdlp_config = app_config.to_ytdlp_config();
    ytdlp_config.validate()?;
    let fetcher = YtDlpFetcher::new(ytdlp_config);
    match fetcher.version().await {
        Ok(version) => info!("Using yt-dlp {}", version),
        Err(e) => warn!("Could not determine yt-dlp version: {}", e),
    }

    let mut urls = Vec::new();
    for url in &args.urls {
        match validate_url(url) {
            Ok(url) => urls.push(url),
            Err(e) => {
                warn!("Skipping {}", e);
                eprintln!("Skipping {}", e);
            }
        }
    }
    if urls.is_empty() {
        return Err(AppError::generic("No valid URLs to download"));
    }

    let status = run_session(manager_config, Arc::new(fetcher), &urls, args.kind()).await?;
    session_result(&status)
}

/// Apply command line overrides on top of the configured settings
fn apply_overrides(config: ManagerConfig, args: &DownloadArgs) -> Result<ManagerConfig> {
    let mut builder = ManagerConfigBuilder::from_config(config);
    if let Some(max) = args.max_concurrent {
        builder = builder.max_concurrent(max);
    }
    if let Some(dir) = &args.output {
        builder = builder.output_dir(dir.clone());
    }
    if let Some(retries) = args.max_retries {
        builder = builder.max_retries(retries);
    }
    if let Some(timeout) = args.stall_timeout {
        builder = builder.stall_timeout(timeout);
    }
    Ok(builder.build()?)
}

/// Handle the simulate command
///
/// Runs the real manager against a scripted fetcher where each strategy of
/// each URL randomly succeeds, fails or stalls.
pub async fn handle_simulate(args: SimulateArgs) -> Result<()> {
    args.validate().map_err(AppError::generic)?;

    let base = ConfigPresets::testing();
    let output_dir = std::env::temp_dir().join("mediagrab-simulate");
    let config = ManagerConfigBuilder::from_config(base)
        .max_concurrent(args.max_concurrent)
        .output_dir(output_dir)
        .build()?;

    let (urls, fetcher) = build_simulation(&args, &config.strategies);
    info!(
        "Simulating {} downloads with {} slots (failure rate {:.2}, stall rate {:.2})",
        urls.len(),
        args.max_concurrent,
        args.failure_rate,
        args.stall_rate
    );

    let status = run_session(config, Arc::new(fetcher), &urls, DownloadKind::Video).await?;
    session_result(&status)
}

/// Script a simulated fetcher for `args.tasks` URLs
pub fn build_simulation(args: &SimulateArgs, table: &StrategyTable) -> (Vec<String>, SimulatedFetcher) {
    let mut rng = match args.seed {
        Some(seed) => fastrand::Rng::with_seed(seed),
        None => fastrand::Rng::new(),
    };

    let mut fetcher = SimulatedFetcher::new();
    let mut urls = Vec::with_capacity(args.tasks);

    for i in 1..=args.tasks {
        let url = format!("https://simulated.test/media/{}", i);
        for strategy in table.strategies_for(DownloadKind::Video) {
            let roll = rng.f64();
            let behavior = if roll < args.failure_rate {
                Behavior::fail("simulated HTTP 403")
            } else if roll < args.failure_rate + args.stall_rate {
                Behavior::Stall {
                    bytes: rng.u64(1024..64 * 1024),
                }
            } else {
                let chunks = rng.u32(5..20);
                Behavior::Succeed {
                    bytes: rng.u64(256 * 1024..4 * 1024 * 1024),
                    chunks,
                    chunk_delay: Duration::from_millis(rng.u64(50..250)),
                }
            };
            debug!("{} / {}: {:?}", url, strategy.name, behavior);
            fetcher = fetcher.with_url_strategy(url.clone(), strategy.name.clone(), behavior);
        }
        urls.push(url);
    }

    (urls, fetcher)
}

/// Submit URLs, render progress until every task finished and return the totals
async fn run_session(
    config: ManagerConfig,
    fetcher: Arc<dyn Fetcher>,
    urls: &[String],
    kind: DownloadKind,
) -> Result<AggregateStatus> {
    let manager = DownloadManager::with_config(config, fetcher)?;
    let events = manager.subscribe();
    let display = tokio::spawn(ProgressDisplay::new(ProgressConfig::default(), urls.len()).run(events));
    let signals = shutdown_on_signal(manager.clone());

    for url in urls {
        let id = manager.submit(url, kind).await?;
        debug!("Submitted {} as task {}", url, id);
    }

    manager.wait_until_idle().await;
    signals.abort();

    let status = manager.aggregate_status().await;
    match display.await {
        Ok(mut display) => display.finish(&status),
        Err(e) => warn!("Progress display task failed: {}", e),
    }
    Ok(status)
}

fn session_result(status: &AggregateStatus) -> Result<()> {
    info!("Session finished: {}", status);
    if status.failed > 0 {
        return Err(AppError::generic(format!(
            "{} of {} download(s) failed",
            status.failed,
            status.total()
        )));
    }
    Ok(())
}

/// Handle the config command
pub async fn handle_config(args: ConfigArgs, config_path: Option<PathBuf>) -> Result<()> {
    match args.action {
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => AppConfig::get_default_config_path()?,
            };
            if path.exists() && !force {
                println!("Configuration file already exists: {}", path.display());
                println!("Use --force to overwrite it.");
                return Ok(());
            }
            AppConfig::write_default(&path).await?;
            println!("Wrote configuration file: {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = AppConfig::load(config_path).await?;
            config.validate()?;
            let rendered = toml::to_string_pretty(&config)
                .map_err(|e| AppError::generic(format!("Failed to render configuration: {}", e)))?;
            println!("{}", rendered);
            Ok(())
        }
    }
}
