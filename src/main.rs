//! Sentinel CLI application.

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use sentinel_config::{load_config, SentinelConfig};
use sentinel_monitor::{setup_logging, LogFormat};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging settings come from the config file when it loads; flags win
    let logging = load_config(&cli.config)
        .map(|c| c.logging)
        .unwrap_or_else(|_| SentinelConfig::default().logging);
    let log_level = match cli.log_level {
        Some(cli::LogLevel::Trace) => "trace",
        Some(cli::LogLevel::Debug) => "debug",
        Some(cli::LogLevel::Info) => "info",
        Some(cli::LogLevel::Warn) => "warn",
        Some(cli::LogLevel::Error) => "error",
        None => logging.level.as_str(),
    };
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        logging.format
    };
    let _guard = setup_logging(log_level, format, logging.file.as_deref());

    // Execute command
    match cli.command {
        Commands::Run(args) => cli::commands::run::run(args, &cli.config).await,
        Commands::Rules { toml } => cli::commands::rules::run(&cli.config, toml).await,
        Commands::ValidateConfig => cli::commands::validate::run(&cli.config).await,
    }
}
