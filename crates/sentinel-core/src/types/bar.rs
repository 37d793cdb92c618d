//! OHLCV bars and the bounded bar window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Compact OHLCV bar.
/// Uses f64 for fast indicator calculations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    /// Opening price
    pub open: f64,
    /// Highest price
    pub high: f64,
    /// Lowest price
    pub low: f64,
    /// Closing price
    pub close: f64,
    /// Trading volume
    pub volume: f64,
}

impl Bar {
    /// Create a new bar.
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Read a single field.
    #[inline]
    pub fn field(&self, field: BarField) -> f64 {
        match field {
            BarField::Open => self.open,
            BarField::High => self.high,
            BarField::Low => self.low,
            BarField::Close => self.close,
            BarField::Volume => self.volume,
            BarField::Typical => self.typical_price(),
        }
    }

    /// Calculate the typical price (HLC average).
    #[inline]
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// Calculate the bar's range (high - low).
    #[inline]
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Check that prices are finite, positive and consistent with each other.
    pub fn is_consistent(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        prices.iter().all(|p| p.is_finite() && *p > 0.0)
            && self.volume.is_finite()
            && self.volume >= 0.0
            && self.low <= self.high
            && (self.low..=self.high).contains(&self.open)
            && (self.low..=self.high).contains(&self.close)
    }

    /// Get the timestamp as a DateTime.
    pub fn datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.timestamp).unwrap_or_default()
    }
}

/// A single column of a bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BarField {
    Open,
    High,
    Low,
    #[default]
    Close,
    Volume,
    Typical,
}

impl fmt::Display for BarField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BarField::Open => "open",
            BarField::High => "high",
            BarField::Low => "low",
            BarField::Close => "close",
            BarField::Volume => "volume",
            BarField::Typical => "typical",
        };
        write!(f, "{}", s)
    }
}

/// Fixed-capacity window of the most recent bars, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct BarWindow {
    bars: VecDeque<Bar>,
    capacity: usize,
}

impl BarWindow {
    /// Create an empty window. A capacity of zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            bars: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a new bar, returning the evicted oldest bar when at capacity.
    pub fn push(&mut self, bar: Bar) -> Option<Bar> {
        let evicted = if self.bars.len() >= self.capacity {
            self.bars.pop_front()
        } else {
            None
        };
        self.bars.push_back(bar);
        evicted
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the last bar.
    pub fn last(&self) -> Option<&Bar> {
        self.bars.back()
    }

    /// Get the bar `ago` positions back from the newest (0 = newest).
    pub fn ago(&self, ago: usize) -> Option<&Bar> {
        let len = self.bars.len();
        if ago >= len {
            return None;
        }
        self.bars.get(len - 1 - ago)
    }

    /// Get an iterator over the bars, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Bar> {
        self.bars.iter()
    }

    /// Extract close prices as a vector.
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ts: i64, close: f64) -> Bar {
        Bar::new(ts, close, close + 1.0, close - 1.0, close, 1000.0)
    }

    #[test]
    fn test_bar_calculations() {
        let bar = Bar::new(1000, 100.0, 110.0, 95.0, 105.0, 1000000.0);

        assert!((bar.typical_price() - 103.333333).abs() < 0.001);
        assert!((bar.range() - 15.0).abs() < 0.001);
        assert_eq!(bar.field(BarField::High), 110.0);
        assert!(bar.is_consistent());
    }

    #[test]
    fn test_bar_consistency() {
        assert!(!Bar::new(1, 100.0, 99.0, 101.0, 100.0, 1.0).is_consistent());
        assert!(!Bar::new(1, 100.0, 101.0, 99.0, 102.0, 1.0).is_consistent());
        assert!(!Bar::new(1, f64::NAN, 101.0, 99.0, 100.0, 1.0).is_consistent());
        assert!(!Bar::new(1, 100.0, 101.0, 99.0, 100.0, -5.0).is_consistent());
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut window = BarWindow::with_capacity(3);

        assert!(window.push(bar(1, 10.0)).is_none());
        assert!(window.push(bar(2, 12.0)).is_none());
        assert!(window.push(bar(3, 9.0)).is_none());
        assert_eq!(window.len(), 3);

        let evicted = window.push(bar(4, 11.0)).unwrap();
        assert_eq!(evicted.timestamp, 1);
        assert_eq!(window.len(), 3);
        assert_eq!(window.closes(), vec![12.0, 9.0, 11.0]);
    }

    #[test]
    fn test_window_ago() {
        let mut window = BarWindow::with_capacity(5);
        window.push(bar(1, 10.0));
        window.push(bar(2, 11.0));

        assert_eq!(window.ago(0).unwrap().close, 11.0);
        assert_eq!(window.ago(1).unwrap().close, 10.0);
        assert!(window.ago(2).is_none());
    }
}
