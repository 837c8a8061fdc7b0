// QQQ - Table actions, cache tables and streamed ETL
// Copyright (c) 2025 QQQ Contributors
// Licensed under the MIT License

use qqq::cli::{Cli, Commands};
use qqq::config::{load_config, LoggingConfig};
use qqq::logging::init_logging;
use clap::Parser;
use std::process;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Only `run` writes log files; other commands log to the console
    let (config_level, logging_config) = match &cli.command {
        Commands::Run(_) => match load_config(&cli.config) {
            Ok(config) => (Some(config.application.log_level), config.logging),
            Err(_) => (None, LoggingConfig::console_only()),
        },
        _ => (None, LoggingConfig::console_only()),
    };
    let log_level = cli
        .log_level
        .clone()
        .or(config_level)
        .unwrap_or_else(|| "info".to_string());

    let guard = match init_logging(&log_level, &logging_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(5);
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "QQQ - table actions and streamed ETL"
    );

    let exit_code = match execute_command(&cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command execution failed");
            eprintln!("Error: {e}");
            5 // Fatal error exit code
        }
    };

    // Flush file logs before exiting
    drop(guard);
    process::exit(exit_code);
}

/// Execute the CLI command
async fn execute_command(cli: &Cli) -> anyhow::Result<i32> {
    match &cli.command {
        Commands::Run(args) => args.execute(&cli.config).await,
        Commands::ValidateConfig(args) => args.execute(&cli.config).await,
        Commands::Init(args) => args.execute().await,
    }
}
