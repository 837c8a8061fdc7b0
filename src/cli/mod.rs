//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for QQQ using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// QQQ - table actions and streamed ETL processes
#[derive(Parser, Debug)]
#[command(name = "qqq")]
#[command(version, about, long_about = None)]
#[command(author = "QQQ Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "qqq.toml", env = "QQQ_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "QQQ_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Preview, validate and execute a streamed ETL process
    Run(commands::run::RunArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}
