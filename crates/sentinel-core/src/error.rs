//! Error types for the alerting core.
//!
//! Only configuration-time errors (`RuleError::DuplicateRuleId`,
//! `RuleError::InvalidRule`, `ConfigError`) are fatal. Everything else is
//! local to one event, one rule or one delivery and is logged and counted.

use thiserror::Error;

/// Top-level error.
#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while reading or controlling the market feed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedError {
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Sequence gap on {symbol}: expected {expected}, got {received}")]
    SequenceGap {
        symbol: String,
        expected: u64,
        received: u64,
    },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Subscription error for {symbol}: {reason}")]
    Subscription { symbol: String, reason: String },

    #[error("Feed IO error: {0}")]
    Io(String),
}

impl FeedError {
    /// Number of events skipped, for gap observations.
    pub fn missing_events(&self) -> u64 {
        match self {
            FeedError::SequenceGap {
                expected, received, ..
            } => received.saturating_sub(*expected),
            _ => 0,
        }
    }
}

/// Rule registration and evaluation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("Duplicate rule id: {0}")]
    DuplicateRuleId(String),

    #[error("Invalid rule {rule_id}: {reason}")]
    InvalidRule { rule_id: String, reason: String },

    #[error("Rule {rule_id} failed on {symbol}: {reason}")]
    Evaluation {
        rule_id: String,
        symbol: String,
        reason: String,
    },
}

/// Failure reported by the notification collaborator for one send.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// Network hiccup, timeout, rate limit. Worth retrying.
    #[error("transient: {0}")]
    Transient(String),

    /// Invalid destination, rejected payload. Never retried.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl NotifyError {
    pub fn is_transient(&self) -> bool {
        matches!(self, NotifyError::Transient(_))
    }
}

/// Delivery errors surfaced by the dispatcher.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeliveryError {
    #[error("Transient delivery failure after attempt {attempt}: {reason}")]
    Transient { attempt: u32, reason: String },

    #[error("Permanent delivery failure after {attempts} attempt(s): {reason}")]
    Permanent {
        attempts: u32,
        reason: String,
        exhausted: bool,
    },
}

/// Configuration errors. Always fatal at startup.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Missing required setting: {0}")]
    Missing(String),

    #[error("Unknown preset: {0}")]
    UnknownPreset(String),
}

/// Result type alias for core operations.
pub type SentinelResult<T> = Result<T, SentinelError>;
