//! getproxy - caching package proxy
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use getproxy::cli::{Cli, Commands};
use getproxy::config::ConfigManager;
use getproxy::error::ProxyResult;
use std::process::ExitCode;
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

async fn run() -> ProxyResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    // RUST_LOG wins; otherwise 0 = info, 1 = debug, 2+ = trace
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match cli.verbose {
        0 => EnvFilter::new("getproxy=info,tower_http=warn"),
        1 => EnvFilter::new("getproxy=debug,tower_http=debug"),
        _ => EnvFilter::new("getproxy=trace,tower_http=trace"),
    });
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.general.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.with_target(false).init();
    }

    match cli.command {
        Commands::Serve(args) => getproxy::cli::commands::serve(args, &config).await,
        Commands::Fetch(args) => getproxy::cli::commands::fetch(args, &config).await,
        Commands::Config(args) => {
            getproxy::cli::commands::config(args, &config, &config_manager).await
        }
    }
}
