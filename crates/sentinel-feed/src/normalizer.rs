//! Event normalizer.
//!
//! Turns raw feed messages into [`MarketEvent`]s with a per-symbol sequence
//! number. Messages that fail to parse or validate are rejected with
//! [`FeedError::MalformedEvent`]; the caller drops and counts them.

use chrono::Utc;
use std::collections::HashMap;
use tracing::{debug, warn};

use sentinel_core::error::FeedError;
use sentinel_core::types::{Bar, EventPayload, MarketEvent};

use crate::raw::{LinkState, RawMessage};

/// A normalized event, plus the sequence gap observed on the way in, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub event: MarketEvent,
    pub gap: Option<FeedError>,
}

/// Running counts kept by the normalizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizerCounts {
    pub received: u64,
    pub malformed: u64,
    pub gaps: u64,
    pub missing_events: u64,
}

/// Stateful normalizer. Owned by the single ingress task.
#[derive(Debug, Default)]
pub struct Normalizer {
    /// Highest sequence seen per symbol
    sequences: HashMap<String, u64>,
    counts: NormalizerCounts,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counts(&self) -> NormalizerCounts {
        self.counts
    }

    /// Normalize one raw JSON message.
    pub fn normalize_str(&mut self, raw: &str) -> Result<Normalized, FeedError> {
        match RawMessage::parse(raw) {
            Ok(message) => self.normalize(message),
            Err(e) => {
                self.counts.received += 1;
                self.counts.malformed += 1;
                Err(e)
            }
        }
    }

    /// Normalize an already parsed message.
    pub fn normalize(&mut self, message: RawMessage) -> Result<Normalized, FeedError> {
        self.counts.received += 1;
        let result = self.convert(message);
        if result.is_err() {
            self.counts.malformed += 1;
        }
        result
    }

    fn convert(&mut self, message: RawMessage) -> Result<Normalized, FeedError> {
        match message {
            RawMessage::Tick {
                symbol,
                price,
                volume,
                seq,
                ts,
            } => {
                let symbol = normalize_symbol(&symbol)?;
                if !price.is_finite() || price <= 0.0 {
                    return Err(malformed(&symbol, format!("invalid price {}", price)));
                }
                check_volume(&symbol, volume)?;

                let (sequence, gap) = self.sequence_for(&symbol, seq);
                let timestamp = ts.unwrap_or_else(now_ms);
                Ok(Normalized {
                    event: MarketEvent::tick(symbol, sequence, timestamp, price, volume),
                    gap,
                })
            }
            RawMessage::Bar {
                symbol,
                open,
                high,
                low,
                close,
                volume,
                seq,
                ts,
            } => {
                let symbol = normalize_symbol(&symbol)?;
                let prices = [open, high, low, close];
                if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
                    return Err(malformed(&symbol, format!("invalid prices {:?}", prices)));
                }
                check_volume(&symbol, volume)?;

                let bar = Bar::new(ts.unwrap_or_else(now_ms), open, high, low, close, volume);
                if !bar.is_consistent() {
                    return Err(malformed(
                        &symbol,
                        format!("inconsistent bar o={} h={} l={} c={}", open, high, low, close),
                    ));
                }

                let (sequence, gap) = self.sequence_for(&symbol, seq);
                Ok(Normalized {
                    event: MarketEvent::bar(symbol, sequence, bar),
                    gap,
                })
            }
            RawMessage::Connection { state } => {
                let payload = match state {
                    LinkState::Up => EventPayload::ConnectionUp,
                    LinkState::Down => EventPayload::ConnectionDown,
                };
                let (sequence, _) = self.sequence_for(MarketEvent::FEED_SYMBOL, None);
                Ok(Normalized {
                    event: MarketEvent::new(MarketEvent::FEED_SYMBOL, sequence, now_ms(), payload),
                    gap: None,
                })
            }
        }
    }

    /// Assign the next sequence, or validate the feed's own one.
    ///
    /// A feed sequence at or below the last seen one is passed through as is
    /// and left for the store to reject as stale.
    fn sequence_for(&mut self, symbol: &str, provided: Option<u64>) -> (u64, Option<FeedError>) {
        let last = self.sequences.get(symbol).copied();

        let Some(seq) = provided else {
            let next = last.map_or(1, |l| l + 1);
            self.sequences.insert(symbol.to_string(), next);
            return (next, None);
        };

        let gap = match last {
            Some(last) if seq > last + 1 => {
                let gap = FeedError::SequenceGap {
                    symbol: symbol.to_string(),
                    expected: last + 1,
                    received: seq,
                };
                self.counts.gaps += 1;
                self.counts.missing_events += gap.missing_events();
                warn!(symbol, expected = last + 1, received = seq, "Sequence gap");
                Some(gap)
            }
            Some(last) if seq <= last => {
                debug!(symbol, seq, last, "Non-increasing sequence from feed");
                None
            }
            _ => None,
        };

        if last.map_or(true, |l| seq > l) {
            self.sequences.insert(symbol.to_string(), seq);
        }
        (seq, gap)
    }
}

fn normalize_symbol(symbol: &str) -> Result<String, FeedError> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(FeedError::MalformedEvent("empty symbol".into()));
    }
    Ok(symbol.to_uppercase())
}

fn check_volume(symbol: &str, volume: f64) -> Result<(), FeedError> {
    if !volume.is_finite() || volume < 0.0 {
        return Err(malformed(symbol, format!("invalid volume {}", volume)));
    }
    Ok(())
}

fn malformed(symbol: &str, reason: String) -> FeedError {
    FeedError::MalformedEvent(format!("{}: {}", symbol, reason))
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
