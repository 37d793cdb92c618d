//! Momentum indicators.

use sentinel_core::traits::StreamingIndicator;

/// Relative Strength Index (RSI).
///
/// Measures the speed and magnitude of recent price changes
/// to evaluate overbought or oversold conditions. Gains and losses are
/// smoothed with Wilder's method, one change at a time.
#[derive(Debug, Clone)]
pub struct Rsi {
    name: String,
    period: usize,
    prev: Option<f64>,
    changes: usize,
    gain_sum: f64,
    loss_sum: f64,
    avg_gain: Option<f64>,
    avg_loss: Option<f64>,
}

impl Rsi {
    /// Create a new RSI indicator.
    ///
    /// Common periods are 14 (default) or 9. The first value is available
    /// after `period + 1` updates.
    pub fn new(name: impl Into<String>, period: usize) -> Self {
        assert!(period > 0, "Period must be greater than 0");
        Self {
            name: name.into(),
            period,
            prev: None,
            changes: 0,
            gain_sum: 0.0,
            loss_sum: 0.0,
            avg_gain: None,
            avg_loss: None,
        }
    }

    fn value_from(gain: f64, loss: f64) -> f64 {
        if loss == 0.0 {
            100.0
        } else {
            100.0 - (100.0 / (1.0 + gain / loss))
        }
    }
}

impl StreamingIndicator for Rsi {
    fn update(&mut self, value: f64) -> Option<f64> {
        let Some(prev) = self.prev.replace(value) else {
            return None;
        };

        let change = value - prev;
        let (gain, loss) = if change > 0.0 {
            (change, 0.0)
        } else {
            (0.0, -change)
        };
        let period = self.period as f64;

        match (self.avg_gain, self.avg_loss) {
            (Some(avg_gain), Some(avg_loss)) => {
                // Wilder's smoothing: avg = (prev_avg * (period-1) + value) / period
                self.avg_gain = Some((avg_gain * (period - 1.0) + gain) / period);
                self.avg_loss = Some((avg_loss * (period - 1.0) + loss) / period);
            }
            _ => {
                self.changes += 1;
                self.gain_sum += gain;
                self.loss_sum += loss;
                if self.changes == self.period {
                    self.avg_gain = Some(self.gain_sum / period);
                    self.avg_loss = Some(self.loss_sum / period);
                }
            }
        }

        self.current()
    }

    fn current(&self) -> Option<f64> {
        match (self.avg_gain, self.avg_loss) {
            (Some(gain), Some(loss)) => Some(Self::value_from(gain, loss)),
            _ => None,
        }
    }

    fn reset(&mut self) {
        self.prev = None;
        self.changes = 0;
        self.gain_sum = 0.0;
        self.loss_sum = 0.0;
        self.avg_gain = None;
        self.avg_loss = None;
    }

    fn period(&self) -> usize {
        self.period + 1 // Need period+1 data points
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn boxed_clone(&self) -> Box<dyn StreamingIndicator> {
        Box::new(self.clone())
    }
}
