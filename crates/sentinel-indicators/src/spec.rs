//! Declarative indicator configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

use sentinel_core::traits::StreamingIndicator;
use sentinel_core::types::BarField;

use crate::{Ema, Highest, Lowest, Rsi, Sma};

/// Indicator family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Sma,
    Ema,
    Highest,
    Lowest,
    Rsi,
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndicatorKind::Sma => "SMA",
            IndicatorKind::Ema => "EMA",
            IndicatorKind::Highest => "HIGHEST",
            IndicatorKind::Lowest => "LOWEST",
            IndicatorKind::Rsi => "RSI",
        };
        write!(f, "{}", s)
    }
}

/// A named indicator over one bar field.
///
/// ```toml
/// [[indicators]]
/// name = "ma20"
/// kind = "sma"
/// period = 20
/// field = "close"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSpec {
    /// Key in the instrument's indicator cache; referenced by rules
    pub name: String,
    pub kind: IndicatorKind,
    pub period: usize,
    #[serde(default)]
    pub field: BarField,
}

impl IndicatorSpec {
    pub fn new(name: impl Into<String>, kind: IndicatorKind, period: usize, field: BarField) -> Self {
        Self {
            name: name.into(),
            kind,
            period,
            field,
        }
    }

    pub fn sma(name: impl Into<String>, period: usize) -> Self {
        Self::new(name, IndicatorKind::Sma, period, BarField::Close)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("indicator name must not be empty".into());
        }
        if self.period == 0 {
            return Err(format!("indicator {} period must be greater than 0", self.name));
        }
        Ok(())
    }

    /// Fresh, empty indicator instance for one symbol.
    pub fn build(&self) -> Box<dyn StreamingIndicator> {
        let name = self.name.clone();
        match self.kind {
            IndicatorKind::Sma => Box::new(Sma::new(name, self.period)),
            IndicatorKind::Ema => Box::new(Ema::new(name, self.period)),
            IndicatorKind::Highest => Box::new(Highest::new(name, self.period)),
            IndicatorKind::Lowest => Box::new(Lowest::new(name, self.period)),
            IndicatorKind::Rsi => Box::new(Rsi::new(name, self.period)),
        }
    }
}

impl fmt::Display for IndicatorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}({}, {})", self.name, self.kind, self.field, self.period)
    }
}
