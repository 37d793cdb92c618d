//! CLI definitions.

pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sentinel")]
#[command(author, version, about = "Streaming market-alert engine")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml", env = "SENTINEL_CONFIG")]
    pub config: PathBuf,

    /// Log level, overrides the configured one
    #[arg(short, long)]
    pub log_level: Option<LogLevel>,

    /// Enable JSON log format
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay a recorded feed through the alert pipeline
    Run(RunArgs),
    /// List configured rules and built-in presets
    Rules {
        /// Print the expanded rule set as TOML instead
        #[arg(long)]
        toml: bool,
    },
    /// Validate configuration
    ValidateConfig,
}

#[derive(clap::Args)]
pub struct RunArgs {
    /// Feed file: JSON lines of raw messages, or OHLCV CSV with --csv-symbol
    #[arg(short, long)]
    pub feed: PathBuf,

    /// Read --feed as an OHLCV CSV file of bars for this symbol
    #[arg(long)]
    pub csv_symbol: Option<String>,

    /// Log alerts instead of sending them
    #[arg(long)]
    pub dry_run: bool,

    /// Output format for the final statistics (text, json)
    #[arg(long, default_value = "text")]
    pub output: String,
}
