//! Normalized market events.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Bar;

/// A single trade/quote price update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub price: f64,
    pub volume: f64,
}

/// Payload of a market event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    Tick(Tick),
    BarClose(Bar),
    ConnectionUp,
    ConnectionDown,
}

/// Discriminant of an [`EventPayload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Tick,
    BarClose,
    ConnectionUp,
    ConnectionDown,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::Tick => "tick",
            EventKind::BarClose => "bar_close",
            EventKind::ConnectionUp => "connection_up",
            EventKind::ConnectionDown => "connection_down",
        };
        write!(f, "{}", s)
    }
}

/// Normalized event produced from one raw feed message.
///
/// Sequence numbers are strictly increasing per symbol. Connection events are
/// feed-wide and use [`MarketEvent::FEED_SYMBOL`] with their own sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEvent {
    pub symbol: String,
    pub sequence: u64,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    pub payload: EventPayload,
}

impl MarketEvent {
    /// Symbol used by feed-wide connection events.
    pub const FEED_SYMBOL: &'static str = "*feed*";

    pub fn new(symbol: impl Into<String>, sequence: u64, timestamp: i64, payload: EventPayload) -> Self {
        Self {
            symbol: symbol.into(),
            sequence,
            timestamp,
            payload,
        }
    }

    /// Convenience constructor for a tick.
    pub fn tick(symbol: impl Into<String>, sequence: u64, timestamp: i64, price: f64, volume: f64) -> Self {
        Self::new(symbol, sequence, timestamp, EventPayload::Tick(Tick { price, volume }))
    }

    /// Convenience constructor for a bar close; the event takes the bar's timestamp.
    pub fn bar(symbol: impl Into<String>, sequence: u64, bar: Bar) -> Self {
        Self::new(symbol, sequence, bar.timestamp, EventPayload::BarClose(bar))
    }

    pub fn kind(&self) -> EventKind {
        match self.payload {
            EventPayload::Tick(_) => EventKind::Tick,
            EventPayload::BarClose(_) => EventKind::BarClose,
            EventPayload::ConnectionUp => EventKind::ConnectionUp,
            EventPayload::ConnectionDown => EventKind::ConnectionDown,
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(
            self.payload,
            EventPayload::ConnectionUp | EventPayload::ConnectionDown
        )
    }
}
