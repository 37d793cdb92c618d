//! Validate configuration command.

use anyhow::Result;
use std::path::Path;

use sentinel_config::load_config;

pub async fn run(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {:?}", config_path);

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("Configuration error: {}", e);
            return Err(e.into());
        }
    };

    match config.build_engine() {
        Ok((engine, indicators)) => {
            println!("Configuration is valid!");
            println!();
            println!("App: {}", config.app.name);
            println!("Environment: {}", config.app.environment);
            println!("Log level: {}", config.logging.level);
            println!("Symbols: {}", config.feed.normalized_symbols().join(", "));
            println!("Shards: {}", config.feed.shards);
            println!("Rules: {}", engine.len());
            println!("Indicators: {}", indicators.len());
            println!("Notifier: {:?}", config.notifier.kind);
            println!("Max delivery attempts: {}", config.dispatcher.max_attempts);
            if let Some(path) = &config.cooldown.state_file {
                println!("Cooldown state: {}", path.display());
            }
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
