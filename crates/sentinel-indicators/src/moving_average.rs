//! Moving average indicators.

use sentinel_core::traits::StreamingIndicator;
use std::collections::VecDeque;

/// Simple Moving Average (SMA).
///
/// Keeps the last N values and a running sum: the value leaving the window
/// is subtracted, the new one added.
#[derive(Debug, Clone)]
pub struct Sma {
    name: String,
    period: usize,
    values: VecDeque<f64>,
    sum: f64,
}

impl Sma {
    /// Create a new SMA with the specified period.
    pub fn new(name: impl Into<String>, period: usize) -> Self {
        assert!(period > 0, "Period must be greater than 0");
        Self {
            name: name.into(),
            period,
            values: VecDeque::with_capacity(period),
            sum: 0.0,
        }
    }
}

impl StreamingIndicator for Sma {
    fn update(&mut self, value: f64) -> Option<f64> {
        if self.values.len() == self.period {
            if let Some(oldest) = self.values.pop_front() {
                self.sum -= oldest;
            }
        }
        self.values.push_back(value);
        self.sum += value;
        self.current()
    }

    fn current(&self) -> Option<f64> {
        if self.values.len() < self.period {
            return None;
        }
        Some(self.sum / self.period as f64)
    }

    fn reset(&mut self) {
        self.values.clear();
        self.sum = 0.0;
    }

    fn period(&self) -> usize {
        self.period
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn boxed_clone(&self) -> Box<dyn StreamingIndicator> {
        Box::new(self.clone())
    }
}

/// Exponential Moving Average (EMA).
///
/// Seeded with the SMA of the first `period` values, then
/// `ema = value * k + ema * (1 - k)` with `k = 2 / (period + 1)`.
#[derive(Debug, Clone)]
pub struct Ema {
    name: String,
    period: usize,
    multiplier: f64,
    current: Option<f64>,
    count: usize,
    sum: f64,
}

impl Ema {
    /// Create a new EMA.
    pub fn new(name: impl Into<String>, period: usize) -> Self {
        assert!(period > 0, "Period must be greater than 0");
        let multiplier = 2.0 / (period as f64 + 1.0);
        Self {
            name: name.into(),
            period,
            multiplier,
            current: None,
            count: 0,
            sum: 0.0,
        }
    }
}

impl StreamingIndicator for Ema {
    fn update(&mut self, value: f64) -> Option<f64> {
        self.count += 1;

        match self.current {
            Some(ema) => {
                self.current = Some(value * self.multiplier + ema * (1.0 - self.multiplier));
            }
            None => {
                // Accumulating for initial SMA
                self.sum += value;
                if self.count == self.period {
                    self.current = Some(self.sum / self.period as f64);
                }
            }
        }
        self.current
    }

    fn current(&self) -> Option<f64> {
        self.current
    }

    fn reset(&mut self) {
        self.current = None;
        self.count = 0;
        self.sum = 0.0;
    }

    fn period(&self) -> usize {
        self.period
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn boxed_clone(&self) -> Box<dyn StreamingIndicator> {
        Box::new(self.clone())
    }
}
