//! mediagrab CLI application
//!
//! Command-line interface for downloading media from many URLs at once with
//! bounded concurrency, fallback strategies and stall detection.

use std::process;

use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use mediagrab::cli::{handle_config, handle_download, handle_simulate, Cli, Commands};
use mediagrab::constants::logging::LOG_TARGET;
use mediagrab::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();
    init_logging(&cli);

    info!("mediagrab v{} starting", env!("CARGO_PKG_VERSION"));

    let config_path = cli.global.config.clone();
    match cli.command {
        Commands::Download(args) => {
            info!("Executing download command for {} URL(s)", args.urls.len());
            handle_download(args, config_path).await
        }
        Commands::Simulate(args) => {
            info!("Executing simulate command with {} task(s)", args.tasks);
            handle_simulate(args).await
        }
        Commands::Config(args) => handle_config(args, config_path).await,
    }
}

/// Initialize logging based on CLI verbosity settings
fn init_logging(cli: &Cli) {
    let log_level = cli.log_level();

    let mut filter = EnvFilter::from_default_env();
    let directive = format!("{}={}", LOG_TARGET, log_level);
    let rejected = match directive.parse() {
        Ok(directive) => {
            filter = filter.add_directive(directive);
            None
        }
        Err(e) => Some(e),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose) // Show levels only in very verbose mode
        .init();

    if let Some(e) = rejected {
        warn!("Ignoring log directive '{}': {}", directive, e);
    }

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}
