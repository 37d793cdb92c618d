//! List rules command.

use anyhow::Result;
use std::path::Path;
use tracing::warn;

use sentinel_config::load_config;
use sentinel_rules::PresetRegistry;

pub async fn run(config_path: &Path, as_toml: bool) -> Result<()> {
    let registry = PresetRegistry::new();

    if as_toml {
        let config = load_config(config_path)?;
        print!("{}", config.rule_set(&registry)?.to_toml()?);
        return Ok(());
    }

    println!("Built-in Presets");
    println!("═══════════════════════════════════════════════════════════");
    println!();

    for (key, info) in registry.list() {
        println!("  {} ({})", info.name, key);
        println!("  ───────────────────────────────────────────────────────");
        println!("  {}", info.description);
        println!("  Defaults: {}", info.default_config);
        println!();
    }

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Configuration not loaded, configured rules not shown");
            return Ok(());
        }
    };
    let rule_set = config.rule_set(&registry)?;

    println!("Configured Rules ({})", config_path.display());
    println!("═══════════════════════════════════════════════════════════");
    println!();

    for rule in &rule_set.rules {
        println!("  {} [{}] cooldown {}s", rule.id, rule.symbol, rule.cooldown_secs);
        println!("    {}", rule.describe());
    }
    if rule_set.rules.is_empty() {
        println!("  (none)");
    }
    println!();

    if !rule_set.indicators.is_empty() {
        println!("Indicators");
        for spec in &rule_set.indicators {
            println!("  {}", spec);
        }
    }

    Ok(())
}
