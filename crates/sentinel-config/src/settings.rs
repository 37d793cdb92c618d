//! Configuration structures.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use sentinel_alerts::DispatcherConfig;
use sentinel_core::error::ConfigError;
use sentinel_core::Backoff;
use sentinel_indicators::IndicatorSpec;
use sentinel_monitor::LogFormat;
use sentinel_rules::{RuleDefinition, SymbolFilter};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SentinelConfig {
    #[serde(default)]
    pub app: AppSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub feed: FeedSettings,
    #[serde(default)]
    pub indicators: Vec<IndicatorSpec>,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
    #[serde(default)]
    pub presets: Vec<PresetSettings>,
    #[serde(default)]
    pub dispatcher: DispatcherSettings,
    #[serde(default)]
    pub notifier: NotifierSettings,
    #[serde(default)]
    pub supervisor: SupervisorSettings,
    #[serde(default)]
    pub cooldown: CooldownSettings,
}

/// General app settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    pub name: String,
    pub environment: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: "sentinel".to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

/// Feed and ingestion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    /// Symbols to subscribe at startup
    pub symbols: Vec<String>,
    /// Bars kept per symbol
    pub window_capacity: usize,
    /// Number of shard tasks; a symbol always maps to the same shard
    pub shards: usize,
    /// Pending events per shard
    pub shard_queue: usize,
    /// Raw messages buffered ahead of the normalizer
    pub ingress_buffer: usize,
    /// Delay between replayed messages, 0 for as fast as possible
    pub replay_pace_ms: u64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            window_capacity: 50,
            shards: 4,
            shard_queue: 1024,
            ingress_buffer: 1024,
            replay_pace_ms: 0,
        }
    }
}

impl FeedSettings {
    /// Configured symbols, trimmed and upper-cased.
    pub fn normalized_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .symbols
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }

    pub fn replay_pace(&self) -> Option<Duration> {
        (self.replay_pace_ms > 0).then(|| Duration::from_millis(self.replay_pace_ms))
    }
}

/// A built-in rule preset to enable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetSettings {
    /// Preset key (`ma_crossover`, `volume_spike`, `breakout`)
    pub name: String,
    #[serde(default)]
    pub symbol: SymbolFilter,
    /// Preset parameters; missing fields take the preset defaults
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Dispatcher and alert queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherSettings {
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub attempt_timeout_secs: u64,
    /// Chat id, channel or other notifier destination
    pub destination: String,
    /// Admitted signals waiting for delivery; the oldest is dropped when full
    pub queue_capacity: usize,
    /// Default message template
    pub template: Option<String>,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        let defaults = DispatcherConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            backoff: defaults.backoff,
            attempt_timeout_secs: defaults.attempt_timeout_secs,
            destination: defaults.destination,
            queue_capacity: 256,
            template: None,
        }
    }
}

impl DispatcherSettings {
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            attempt_timeout_secs: self.attempt_timeout_secs,
            destination: self.destination.clone(),
        }
    }
}

/// Notification transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    /// Log alerts instead of sending them
    #[default]
    Log,
    Webhook,
    Telegram,
}

/// Notifier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierSettings {
    pub kind: NotifierKind,
    /// Webhook endpoint
    pub url: Option<String>,
    /// Environment variable holding the Telegram bot token
    pub token_env: String,
    /// Telegram API base URL override
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    /// Send startup and shutdown notices
    pub announce: bool,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            kind: NotifierKind::Log,
            url: None,
            token_env: "TELEGRAM_BOT_TOKEN".to_string(),
            base_url: None,
            timeout_secs: 10,
            announce: true,
        }
    }
}

impl NotifierSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Read the Telegram bot token from the configured environment variable.
    pub fn telegram_token(&self) -> Result<String, ConfigError> {
        match std::env::var(&self.token_env) {
            Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
            _ => Err(ConfigError::Missing(self.token_env.clone())),
        }
    }
}

/// Reconnect supervisor settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SupervisorSettings {
    pub backoff: Backoff,
}

/// Cooldown settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownSettings {
    /// Cooldown for signals whose rule is not registered
    pub default_secs: u64,
    /// File the cooldown state is saved to on shutdown and restored from on start
    pub state_file: Option<PathBuf>,
}

impl Default for CooldownSettings {
    fn default() -> Self {
        Self {
            default_secs: 300,
            state_file: None,
        }
    }
}

impl CooldownSettings {
    pub fn default_cooldown(&self) -> Duration {
        Duration::from_secs(self.default_secs)
    }
}
