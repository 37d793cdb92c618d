//! Built-in rule presets.
//!
//! Each preset expands into ordinary rule definitions plus the indicators
//! they read:
//! - `ma_crossover`: close crossing a moving average, both directions
//! - `volume_spike`: bar volume above a multiple of its moving average
//! - `breakout`: close above the prior rolling high or below the prior low

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use sentinel_core::error::ConfigError;
use sentinel_core::types::BarField;
use sentinel_indicators::{IndicatorKind, IndicatorSpec};

use crate::definition::{RuleDefinition, SymbolFilter};
use crate::expr::{CompareOp, Condition, Value};

/// Information about a built-in preset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetInfo {
    /// Preset name
    pub name: String,
    /// Preset description
    pub description: String,
    /// Default configuration as JSON
    pub default_config: serde_json::Value,
}

/// Rules and indicators produced by a preset.
#[derive(Debug, Clone, Default)]
pub struct PresetExpansion {
    pub indicators: Vec<IndicatorSpec>,
    pub rules: Vec<RuleDefinition>,
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Configuration for the `ma_crossover` preset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaCrossoverConfig {
    /// Moving average period
    pub period: usize,
    /// Use EMA instead of SMA
    pub use_ema: bool,
    pub cooldown_secs: u64,
}

impl Default for MaCrossoverConfig {
    fn default() -> Self {
        Self {
            period: 20,
            use_ema: false,
            cooldown_secs: 300,
        }
    }
}

impl MaCrossoverConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.period == 0 {
            return Err(invalid("ma_crossover.period", "must be greater than 0"));
        }
        Ok(())
    }

    fn expand(&self, symbol: &SymbolFilter) -> PresetExpansion {
        let (kind, prefix) = if self.use_ema {
            (IndicatorKind::Ema, "ema")
        } else {
            (IndicatorKind::Sma, "ma")
        };
        let ma = format!("{}{}", prefix, self.period);
        let label = ma.to_uppercase();

        let bullish = RuleDefinition::new(
            "ma_crossover_bullish",
            symbol.clone(),
            Condition::crosses_above(Value::close(), Value::indicator(&ma)),
        )
        .with_description(format!("Close crossed above {}", label))
        .with_template(format!(
            "🟢 {{symbol}} crossed above {}: ${{close}} > ${{{}}}",
            label, ma
        ));

        let bearish = RuleDefinition::new(
            "ma_crossover_bearish",
            symbol.clone(),
            Condition::crosses_below(Value::close(), Value::indicator(&ma)),
        )
        .with_description(format!("Close crossed below {}", label))
        .with_template(format!(
            "🔴 {{symbol}} crossed below {}: ${{close}} < ${{{}}}",
            label, ma
        ));

        PresetExpansion {
            indicators: vec![IndicatorSpec::new(&ma, kind, self.period, BarField::Close)],
            rules: vec![bullish, bearish]
                .into_iter()
                .map(|r| r.with_cooldown(std::time::Duration::from_secs(self.cooldown_secs)))
                .collect(),
        }
    }
}

/// Configuration for the `volume_spike` preset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeSpikeConfig {
    /// Bars in the volume average
    pub period: usize,
    /// Spike when volume exceeds `multiplier` times the average
    pub multiplier: f64,
    pub cooldown_secs: u64,
}

impl Default for VolumeSpikeConfig {
    fn default() -> Self {
        Self {
            period: 20,
            multiplier: 2.0,
            cooldown_secs: 300,
        }
    }
}

impl VolumeSpikeConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.period == 0 {
            return Err(invalid("volume_spike.period", "must be greater than 0"));
        }
        if !self.multiplier.is_finite() || self.multiplier <= 0.0 {
            return Err(invalid("volume_spike.multiplier", "must be a positive number"));
        }
        Ok(())
    }

    fn expand(&self, symbol: &SymbolFilter) -> PresetExpansion {
        let avg = format!("vol_ma{}", self.period);

        let rule = RuleDefinition::new(
            "volume_spike",
            symbol.clone(),
            Condition::compare(
                Value::bar(BarField::Volume, 0),
                CompareOp::Gt,
                Value::mul(Value::constant(self.multiplier), Value::indicator(&avg)),
            ),
        )
        .with_description(format!(
            "Volume above {}x its {}-bar average",
            self.multiplier, self.period
        ))
        .with_template(format!(
            "📊 {{symbol}} volume spike: {{bar_volume}} vs average {{{}}}",
            avg
        ))
        .with_cooldown(std::time::Duration::from_secs(self.cooldown_secs));

        PresetExpansion {
            indicators: vec![IndicatorSpec::new(
                &avg,
                IndicatorKind::Sma,
                self.period,
                BarField::Volume,
            )],
            rules: vec![rule],
        }
    }
}

/// Configuration for the `breakout` preset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakoutConfig {
    /// Bars in the rolling high/low
    pub period: usize,
    pub cooldown_secs: u64,
}

impl Default for BreakoutConfig {
    fn default() -> Self {
        Self {
            period: 20,
            cooldown_secs: 300,
        }
    }
}

impl BreakoutConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.period == 0 {
            return Err(invalid("breakout.period", "must be greater than 0"));
        }
        Ok(())
    }

    fn expand(&self, symbol: &SymbolFilter) -> PresetExpansion {
        let high = format!("hi{}", self.period);
        let low = format!("lo{}", self.period);
        let cooldown = std::time::Duration::from_secs(self.cooldown_secs);

        // Compare against the levels as they stood before the new bar.
        let up = RuleDefinition::new(
            "breakout_up",
            symbol.clone(),
            Condition::compare(
                Value::close(),
                CompareOp::Gt,
                Value::prior(Value::indicator(&high)),
            ),
        )
        .with_description(format!("Close broke above the {}-bar high", self.period))
        .with_template("⬆️ {symbol} breakout above resistance: ${close}")
        .with_cooldown(cooldown);

        let down = RuleDefinition::new(
            "breakout_down",
            symbol.clone(),
            Condition::compare(
                Value::close(),
                CompareOp::Lt,
                Value::prior(Value::indicator(&low)),
            ),
        )
        .with_description(format!("Close broke below the {}-bar low", self.period))
        .with_template("⬇️ {symbol} breakdown below support: ${close}")
        .with_cooldown(cooldown);

        PresetExpansion {
            indicators: vec![
                IndicatorSpec::new(&high, IndicatorKind::Highest, self.period, BarField::High),
                IndicatorSpec::new(&low, IndicatorKind::Lowest, self.period, BarField::Low),
            ],
            rules: vec![up, down],
        }
    }
}

/// Registry of built-in presets.
pub struct PresetRegistry {
    presets: BTreeMap<String, PresetInfo>,
}

impl PresetRegistry {
    /// Create a registry with every built-in preset.
    pub fn new() -> Self {
        let mut presets = BTreeMap::new();

        presets.insert(
            "ma_crossover".to_string(),
            PresetInfo {
                name: "MA Crossover".to_string(),
                description: "Close crossing above or below a moving average".to_string(),
                default_config: serde_json::json!(MaCrossoverConfig::default()),
            },
        );

        presets.insert(
            "volume_spike".to_string(),
            PresetInfo {
                name: "Volume Spike".to_string(),
                description: "Bar volume well above its moving average".to_string(),
                default_config: serde_json::json!(VolumeSpikeConfig::default()),
            },
        );

        presets.insert(
            "breakout".to_string(),
            PresetInfo {
                name: "Breakout".to_string(),
                description: "Close breaking the rolling high or low".to_string(),
                default_config: serde_json::json!(BreakoutConfig::default()),
            },
        );

        Self { presets }
    }

    /// List all presets, sorted by key.
    pub fn list(&self) -> Vec<(&String, &PresetInfo)> {
        self.presets.iter().collect()
    }

    /// Get preset info by key.
    pub fn get(&self, key: &str) -> Option<&PresetInfo> {
        self.presets.get(key)
    }

    /// Check if a preset exists.
    pub fn exists(&self, key: &str) -> bool {
        self.presets.contains_key(key)
    }

    /// Expand a preset. Missing config fields take their defaults.
    pub fn expand(
        &self,
        key: &str,
        config: serde_json::Value,
        symbol: &SymbolFilter,
    ) -> Result<PresetExpansion, ConfigError> {
        let parse_err = |e: serde_json::Error| invalid(key, &e.to_string());
        let config = if config.is_null() {
            serde_json::json!({})
        } else {
            config
        };

        match key {
            "ma_crossover" => {
                let config: MaCrossoverConfig = serde_json::from_value(config).map_err(parse_err)?;
                config.validate()?;
                Ok(config.expand(symbol))
            }
            "volume_spike" => {
                let config: VolumeSpikeConfig = serde_json::from_value(config).map_err(parse_err)?;
                config.validate()?;
                Ok(config.expand(symbol))
            }
            "breakout" => {
                let config: BreakoutConfig = serde_json::from_value(config).map_err(parse_err)?;
                config.validate()?;
                Ok(config.expand(symbol))
            }
            _ => Err(ConfigError::UnknownPreset(key.to_string())),
        }
    }

    /// Expand a preset with its default configuration.
    pub fn expand_default(
        &self,
        key: &str,
        symbol: &SymbolFilter,
    ) -> Result<PresetExpansion, ConfigError> {
        let info = self
            .get(key)
            .ok_or_else(|| ConfigError::UnknownPreset(key.to_string()))?;
        self.expand(key, info.default_config.clone(), symbol)
    }
}

impl Default for PresetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RuleEngine;
    use crate::validate::ValidationContext;
    use sentinel_core::types::{Bar, MarketEvent};
    use sentinel_state::InstrumentStateStore;

    fn engine_for(expansion: &PresetExpansion, window: usize) -> (InstrumentStateStore, RuleEngine) {
        let store = InstrumentStateStore::new(window, expansion.indicators.clone());
        let names = expansion.indicators.iter().map(|s| s.name.clone());
        let mut engine = RuleEngine::new(ValidationContext::new(names, window));
        engine.register_all(expansion.rules.clone()).unwrap();
        (store, engine)
    }

    fn fired(store: &InstrumentStateStore, engine: &RuleEngine, seq: u64, bar: Bar) -> Vec<String> {
        let outcome = store.apply(&MarketEvent::bar("XYZ", seq, bar));
        engine
            .evaluate(outcome.delta().unwrap())
            .signals
            .into_iter()
            .map(|s| s.rule_id)
            .collect()
    }

    #[test]
    fn test_registry_list() {
        let registry = PresetRegistry::new();
        let keys: Vec<&String> = registry.list().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["breakout", "ma_crossover", "volume_spike"]);
        assert!(registry.exists("breakout"));
    }

    #[test]
    fn test_unknown_preset() {
        let registry = PresetRegistry::new();
        let result = registry.expand_default("unknown", &SymbolFilter::Wildcard);
        assert_eq!(result.unwrap_err(), ConfigError::UnknownPreset("unknown".into()));
    }

    #[test]
    fn test_invalid_config() {
        let registry = PresetRegistry::new();
        let result = registry.expand(
            "volume_spike",
            serde_json::json!({ "multiplier": -1.0 }),
            &SymbolFilter::Wildcard,
        );
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_ma_crossover_fires_both_ways() {
        let registry = PresetRegistry::new();
        let expansion = registry
            .expand("ma_crossover", serde_json::json!({ "period": 2 }), &SymbolFilter::Wildcard)
            .unwrap();
        assert_eq!(expansion.indicators[0].name, "ma2");
        let (store, engine) = engine_for(&expansion, 5);

        let flat = |c: f64| Bar::new(0, c, c, c, c, 100.0);
        assert!(fired(&store, &engine, 1, flat(10.0)).is_empty());
        assert!(fired(&store, &engine, 2, flat(10.0)).is_empty());
        // ma 10 -> 10.5, close 10 -> 11
        assert_eq!(fired(&store, &engine, 3, flat(11.0)), vec!["ma_crossover_bullish"]);
        // ma 10.5 -> 10, close 11 -> 9
        assert_eq!(fired(&store, &engine, 4, flat(9.0)), vec!["ma_crossover_bearish"]);
    }

    #[test]
    fn test_volume_spike() {
        let registry = PresetRegistry::new();
        let expansion = registry
            .expand("volume_spike", serde_json::json!({ "period": 3 }), &SymbolFilter::Wildcard)
            .unwrap();
        let (store, engine) = engine_for(&expansion, 5);

        let bar = |v: f64| Bar::new(0, 10.0, 10.0, 10.0, 10.0, v);
        assert!(fired(&store, &engine, 1, bar(100.0)).is_empty());
        assert!(fired(&store, &engine, 2, bar(100.0)).is_empty());
        assert!(fired(&store, &engine, 3, bar(100.0)).is_empty());
        // avg (100 + 100 + 1000) / 3 = 400, 1000 > 800
        assert_eq!(fired(&store, &engine, 4, bar(1000.0)), vec!["volume_spike"]);
    }

    #[test]
    fn test_breakout_against_prior_levels() {
        let registry = PresetRegistry::new();
        let expansion = registry
            .expand("breakout", serde_json::json!({ "period": 2 }), &SymbolFilter::Wildcard)
            .unwrap();
        let (store, engine) = engine_for(&expansion, 5);

        let bar = |l: f64, h: f64, c: f64| Bar::new(0, c, h, l, c, 100.0);
        assert!(fired(&store, &engine, 1, bar(9.0, 11.0, 10.0)).is_empty());
        assert!(fired(&store, &engine, 2, bar(9.5, 11.5, 10.0)).is_empty());
        // prior high 11.5
        assert_eq!(fired(&store, &engine, 3, bar(10.0, 12.5, 12.0)), vec!["breakout_up"]);
        // prior low 9.5
        assert_eq!(fired(&store, &engine, 4, bar(8.0, 10.0, 9.0)), vec!["breakout_down"]);
    }
}
