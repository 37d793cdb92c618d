//! Raw feed messages as they arrive on the wire.
//!
//! ```json
//! {"type": "tick", "symbol": "XYZ", "price": 10.5, "volume": 100, "seq": 7, "ts": 1700000000000}
//! {"type": "bar", "symbol": "XYZ", "open": 10, "high": 11, "low": 9.5, "close": 10.5, "volume": 1200}
//! {"type": "connection", "state": "down"}
//! ```

use serde::{Deserialize, Serialize};

use sentinel_core::error::FeedError;

/// Connection state reported by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Up,
    Down,
}

/// One raw feed message. `seq` and `ts` are optional: missing sequences are
/// assigned by the normalizer, missing timestamps take the arrival time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawMessage {
    Tick {
        symbol: String,
        price: f64,
        #[serde(default)]
        volume: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ts: Option<i64>,
    },
    Bar {
        symbol: String,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        #[serde(default)]
        volume: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ts: Option<i64>,
    },
    Connection {
        state: LinkState,
    },
}

impl RawMessage {
    /// Parse one JSON message.
    pub fn parse(raw: &str) -> Result<Self, FeedError> {
        serde_json::from_str(raw.trim()).map_err(|e| FeedError::MalformedEvent(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, FeedError> {
        serde_json::to_string(self).map_err(|e| FeedError::MalformedEvent(e.to_string()))
    }
}
