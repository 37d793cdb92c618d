//! Signals produced by the rule engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A rule that evaluated true for a symbol at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Unique id, carried through every dispatch log line
    pub id: Uuid,
    pub rule_id: String,
    pub symbol: String,
    /// Event time of the update that fired the rule (Unix ms)
    pub fired_at: i64,
    /// Sequence number of that update
    pub sequence: u64,
    /// Human-readable rule description
    pub description: String,
    /// State values the rule saw: price, volume, indicators, last bar
    pub snapshot: BTreeMap<String, f64>,
}

impl Signal {
    pub fn new(
        rule_id: impl Into<String>,
        symbol: impl Into<String>,
        fired_at: i64,
        sequence: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            rule_id: rule_id.into(),
            symbol: symbol.into(),
            fired_at,
            sequence,
            description: String::new(),
            snapshot: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_snapshot(mut self, snapshot: BTreeMap<String, f64>) -> Self {
        self.snapshot = snapshot;
        self
    }

    /// Cooldown key.
    pub fn key(&self) -> (String, String) {
        (self.rule_id.clone(), self.symbol.clone())
    }

    pub fn fired_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.fired_at).unwrap_or_default()
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.snapshot.get(name).copied()
    }
}
