//! Configuration management.
//!
//! Settings are read from a TOML file and overridden by environment
//! variables (`SENTINEL__DISPATCHER__MAX_ATTEMPTS=5`). Rules and presets are
//! resolved once at startup into a [`RuleSet`]; any error there is fatal.

mod settings;

pub use settings::{
    AppSettings, CooldownSettings, DispatcherSettings, FeedSettings, LoggingConfig, NotifierKind,
    NotifierSettings, PresetSettings, SentinelConfig, SupervisorSettings,
};

use config::{Config, Environment, File, FileFormat};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use sentinel_core::error::{ConfigError, SentinelError, SentinelResult};
use sentinel_indicators::IndicatorSpec;
use sentinel_rules::{PresetRegistry, RuleDefinition, RuleEngine, ValidationContext};

/// Load configuration from file and environment.
pub fn load_config(path: &Path) -> Result<SentinelConfig, config::ConfigError> {
    let config = Config::builder()
        .add_source(File::from(path).required(true))
        .add_source(environment())
        .build()?;

    config.try_deserialize()
}

/// Parse configuration from a TOML string, with environment overrides.
pub fn parse_config(toml: &str) -> Result<SentinelConfig, config::ConfigError> {
    let config = Config::builder()
        .add_source(File::from_str(toml, FileFormat::Toml))
        .add_source(environment())
        .build()?;

    config.try_deserialize()
}

fn environment() -> Environment {
    Environment::with_prefix("SENTINEL")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("feed.symbols")
        .try_parsing(true)
}

/// Indicators and rules after preset expansion.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuleSet {
    pub indicators: Vec<IndicatorSpec>,
    pub rules: Vec<RuleDefinition>,
}

impl RuleSet {
    /// Render as `[[indicators]]` and `[[rules]]` tables that can be pasted
    /// into a config file in place of the presets.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| invalid("rules", &e.to_string()))
    }
}

impl SentinelConfig {
    /// Check settings that do not depend on the rule set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |field: &str, value: usize| {
            if value == 0 {
                Err(invalid(field, "must be greater than 0"))
            } else {
                Ok(())
            }
        };
        positive("feed.window_capacity", self.feed.window_capacity)?;
        positive("feed.shards", self.feed.shards)?;
        positive("feed.shard_queue", self.feed.shard_queue)?;
        positive("feed.ingress_buffer", self.feed.ingress_buffer)?;
        positive("dispatcher.queue_capacity", self.dispatcher.queue_capacity)?;
        positive("dispatcher.max_attempts", self.dispatcher.max_attempts as usize)?;

        self.dispatcher
            .backoff
            .validate()
            .map_err(|e| invalid("dispatcher.backoff", &e))?;
        self.supervisor
            .backoff
            .validate()
            .map_err(|e| invalid("supervisor.backoff", &e))?;

        match self.notifier.kind {
            NotifierKind::Webhook if self.notifier.url.as_deref().map_or(true, str::is_empty) => {
                return Err(ConfigError::Missing("notifier.url".into()));
            }
            NotifierKind::Telegram if self.dispatcher.destination.trim().is_empty() => {
                return Err(ConfigError::Missing("dispatcher.destination".into()));
            }
            _ => {}
        }
        Ok(())
    }

    /// Expand presets and merge their indicators with the configured ones.
    ///
    /// Two indicators may share a name only if they are identical.
    pub fn rule_set(&self, registry: &PresetRegistry) -> Result<RuleSet, ConfigError> {
        let mut indicators: BTreeMap<String, IndicatorSpec> = BTreeMap::new();
        let mut order = Vec::new();
        let mut rules = self.rules.clone();

        let mut add = |spec: IndicatorSpec| -> Result<(), ConfigError> {
            spec.validate()
                .map_err(|e| invalid(&format!("indicators.{}", spec.name), &e))?;
            match indicators.get(&spec.name) {
                Some(existing) if *existing == spec => Ok(()),
                Some(existing) => Err(invalid(
                    &format!("indicators.{}", spec.name),
                    &format!("conflicting definitions {} and {}", existing, spec),
                )),
                None => {
                    order.push(spec.name.clone());
                    indicators.insert(spec.name.clone(), spec);
                    Ok(())
                }
            }
        };

        for spec in &self.indicators {
            add(spec.clone())?;
        }
        for preset in &self.presets {
            let expansion = registry.expand(&preset.name, preset.config.clone(), &preset.symbol)?;
            debug!(
                preset = %preset.name,
                rules = expansion.rules.len(),
                indicators = expansion.indicators.len(),
                "Expanded preset"
            );
            for spec in expansion.indicators {
                add(spec)?;
            }
            rules.extend(expansion.rules);
        }

        let indicators = order
            .into_iter()
            .filter_map(|name| indicators.remove(&name))
            .collect();
        Ok(RuleSet { indicators, rules })
    }

    /// Validate everything and build the rule engine.
    ///
    /// Duplicate rule ids and rules that fail validation abort startup.
    pub fn build_engine(&self) -> SentinelResult<(RuleEngine, Vec<IndicatorSpec>)> {
        self.validate()?;
        let rule_set = self.rule_set(&PresetRegistry::new())?;

        let ctx = ValidationContext::new(
            rule_set.indicators.iter().map(|s| s.name.clone()),
            self.feed.window_capacity,
        );
        let mut engine = RuleEngine::new(ctx);
        engine
            .register_all(rule_set.rules)
            .map_err(SentinelError::from)?;
        Ok((engine, rule_set.indicators))
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::error::RuleError;
    use std::io::Write;

    const SAMPLE: &str = r#"
[feed]
symbols = ["xyz", "abc", "XYZ"]
window_capacity = 3

[[indicators]]
name = "ma20"
kind = "sma"
period = 20

[[rules]]
id = "close_above_11"
symbol = "XYZ"
cooldown_secs = 60
description = "Close above 11"
condition = { op = "compare", left = { type = "bar", field = "close" }, cmp = ">", right = { type = "const", value = 11 } }

[[presets]]
name = "ma_crossover"
config = { period = 20 }

[[presets]]
name = "volume_spike"
symbol = "XYZ"
"#;

    #[test]
    fn test_parse_sample() {
        let config = parse_config(SAMPLE).unwrap();
        assert_eq!(config.feed.normalized_symbols(), vec!["ABC", "XYZ"]);
        assert_eq!(config.feed.window_capacity, 3);
        assert_eq!(config.feed.shards, 4);
        assert_eq!(config.rules[0].cooldown_secs, 60);
        assert_eq!(config.dispatcher.max_attempts, 3);
        assert_eq!(config.notifier.kind, NotifierKind::Log);
        assert!(config.notifier.announce);
    }

    #[test]
    fn test_presets_merge_shared_indicators() {
        let config = parse_config(SAMPLE).unwrap();
        let rule_set = config.rule_set(&PresetRegistry::new()).unwrap();

        let names: Vec<&str> = rule_set.indicators.iter().map(|s| s.name.as_str()).collect();
        // ma20 from the indicators section is reused by the crossover preset
        assert_eq!(names, vec!["ma20", "vol_ma20"]);
        assert_eq!(rule_set.rules.len(), 4);

        let (engine, indicators) = config.build_engine().unwrap();
        assert_eq!(engine.len(), 4);
        assert_eq!(indicators.len(), 2);
    }

    #[test]
    fn test_conflicting_indicator_rejected() {
        let toml = r#"
[[indicators]]
name = "ma20"
kind = "ema"
period = 20

[[presets]]
name = "ma_crossover"
"#;
        let config = parse_config(toml).unwrap();
        assert!(matches!(
            config.rule_set(&PresetRegistry::new()),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_duplicate_rule_id_is_fatal() {
        let toml = r#"
[[rules]]
id = "dup"
condition = { op = "compare", left = { type = "price" }, cmp = ">", right = { type = "const", value = 1 } }

[[rules]]
id = "dup"
condition = { op = "compare", left = { type = "price" }, cmp = "<", right = { type = "const", value = 1 } }
"#;
        let config = parse_config(toml).unwrap();
        match config.build_engine() {
            Err(SentinelError::Rule(RuleError::DuplicateRuleId(id))) => assert_eq!(id, "dup"),
            other => panic!("unexpected {:?}", other.map(|(e, _)| e.len())),
        }
    }

    #[test]
    fn test_unknown_preset_and_invalid_settings() {
        let config = parse_config("[[presets]]\nname = \"golden_cross\"\n").unwrap();
        assert!(matches!(
            config.build_engine(),
            Err(SentinelError::Config(ConfigError::UnknownPreset(_)))
        ));

        let config = parse_config("[feed]\nshards = 0\n").unwrap();
        assert!(config.validate().is_err());

        let config = parse_config("[notifier]\nkind = \"webhook\"\n").unwrap();
        assert_eq!(
            config.validate(),
            Err(ConfigError::Missing("notifier.url".into()))
        );
    }

    #[test]
    fn test_expanded_rule_set_reparses() {
        let config = parse_config(SAMPLE).unwrap();
        let rule_set = config.rule_set(&PresetRegistry::new()).unwrap();
        let rendered = rule_set.to_toml().unwrap();

        let reparsed = parse_config(&rendered).unwrap();
        assert!(reparsed.presets.is_empty());
        assert_eq!(reparsed.indicators, rule_set.indicators);
        assert_eq!(reparsed.rules, rule_set.rules);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(b"[logging]\nlevel = \"debug\"\nformat = \"json\"\n")
            .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, sentinel_monitor::LogFormat::Json);
    }
}
