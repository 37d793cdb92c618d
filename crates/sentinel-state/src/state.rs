//! Instrument state values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use sentinel_core::types::{Bar, BarWindow, EventKind};

/// Point-in-time values derived from the stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub price: Option<f64>,
    pub volume: Option<f64>,
    /// Indicator values keyed by indicator name. Absent until warmed up.
    pub indicators: BTreeMap<String, f64>,
}

impl Frame {
    pub fn indicator(&self, name: &str) -> Option<f64> {
        self.indicators.get(name).copied()
    }
}

/// A piece of state a rule can depend on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateInput {
    Price,
    Volume,
    Bars,
    Indicator(String),
}

impl fmt::Display for StateInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateInput::Price => write!(f, "price"),
            StateInput::Volume => write!(f, "volume"),
            StateInput::Bars => write!(f, "bars"),
            StateInput::Indicator(name) => write!(f, "indicator:{}", name),
        }
    }
}

/// Rolling state of one symbol.
///
/// `previous` holds the frame as it was before the last applied event, so
/// crossing conditions can compare against it.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentState {
    pub symbol: String,
    pub last_sequence: Option<u64>,
    pub last_timestamp: i64,
    /// Kind of the last applied event
    pub last_event: Option<EventKind>,
    pub current: Frame,
    pub previous: Frame,
    pub bars: BarWindow,
    pub ticks_applied: u64,
    pub bars_applied: u64,
}

impl InstrumentState {
    pub fn new(symbol: impl Into<String>, window_capacity: usize) -> Self {
        Self {
            symbol: symbol.into(),
            last_sequence: None,
            last_timestamp: 0,
            last_event: None,
            current: Frame::default(),
            previous: Frame::default(),
            bars: BarWindow::with_capacity(window_capacity),
            ticks_applied: 0,
            bars_applied: 0,
        }
    }

    pub fn last_price(&self) -> Option<f64> {
        self.current.price
    }

    /// Whether the last applied event was a bar close, i.e. whether
    /// `previous` lines up with the bar before the newest one.
    pub fn last_event_was_bar(&self) -> bool {
        self.last_event == Some(EventKind::BarClose)
    }

    pub fn last_bar(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn indicator(&self, name: &str) -> Option<f64> {
        self.current.indicator(name)
    }

    /// Flat view of the current values, as carried by signals.
    pub fn values(&self) -> BTreeMap<String, f64> {
        let mut values = BTreeMap::new();
        if let Some(price) = self.current.price {
            values.insert("price".to_string(), price);
        }
        if let Some(volume) = self.current.volume {
            values.insert("volume".to_string(), volume);
        }
        if let Some(bar) = self.bars.last() {
            values.insert("open".to_string(), bar.open);
            values.insert("high".to_string(), bar.high);
            values.insert("low".to_string(), bar.low);
            values.insert("close".to_string(), bar.close);
            values.insert("bar_volume".to_string(), bar.volume);
        }
        for (name, value) in &self.current.indicators {
            values.insert(name.clone(), *value);
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_flatten_bar_and_indicators() {
        let mut state = InstrumentState::new("XYZ", 3);
        state.current.price = Some(10.5);
        state.bars.push(Bar::new(1, 10.0, 11.0, 9.5, 10.5, 300.0));
        state.current.indicators.insert("ma2".into(), 10.25);

        let values = state.values();
        assert_eq!(values.get("price"), Some(&10.5));
        assert_eq!(values.get("close"), Some(&10.5));
        assert_eq!(values.get("bar_volume"), Some(&300.0));
        assert_eq!(values.get("ma2"), Some(&10.25));
        assert!(!values.contains_key("volume"));
    }

    #[test]
    fn test_input_display() {
        assert_eq!(StateInput::Indicator("ma20".into()).to_string(), "indicator:ma20");
        assert_eq!(StateInput::Bars.to_string(), "bars");
    }
}
