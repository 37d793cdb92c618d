//! Incremental technical indicators.
//!
//! Every indicator here is streaming: one update per closed bar, constant
//! (or amortised constant) cost per update, regardless of the period:
//! - Moving averages (SMA with a running sum, EMA)
//! - Rolling extremes (highest/lowest via monotonic deques)
//! - Momentum (Wilder RSI)
//!
//! [`IndicatorSpec`] is the serialisable description used in configuration;
//! it builds the matching boxed indicator.

pub mod extrema;
pub mod momentum;
pub mod moving_average;
pub mod spec;

pub use extrema::{Highest, Lowest};
pub use momentum::Rsi;
pub use moving_average::{Ema, Sma};
pub use spec::{IndicatorKind, IndicatorSpec};
