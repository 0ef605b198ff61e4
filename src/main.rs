//! Clientlib - bundled, compressed and cached clientlibs
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use clientlib::cli::{Cli, Commands};
use clientlib::config::ConfigManager;
use clientlib::error::ClientlibResult;
use console::style;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> ClientlibResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    // 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("clientlib=warn"),
        1 => EnvFilter::new("clientlib=info"),
        _ => EnvFilter::new("clientlib=debug"),
    };

    // Logs go to stderr so delivered content on stdout stays clean
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if config.general.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.without_time().init();
    }

    debug!("Loaded configuration from {}", config_manager.path().display());

    match cli.command {
        Commands::Prepare(args) => clientlib::cli::commands::prepare(args, &config).await,
        Commands::Deliver(args) => clientlib::cli::commands::deliver(args, &config).await,
        Commands::Reset(args) => clientlib::cli::commands::reset(args, &config).await,
        Commands::Links(args) => clientlib::cli::commands::links(args, &config).await,
        Commands::Config(args) => {
            clientlib::cli::commands::config(args, &config, &config_manager).await
        }
    }
}
