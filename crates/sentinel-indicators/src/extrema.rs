//! Rolling highest/lowest over the last N values.
//!
//! Both use a monotonic deque of `(index, value)` pairs: the front is always
//! the extreme of the current window, entries that can never become the
//! extreme again are popped from the back on insert, and the front is
//! popped once its index leaves the window. Each value is pushed and popped
//! at most once, so updates are amortised O(1).

use sentinel_core::traits::StreamingIndicator;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
struct MonotonicWindow {
    period: usize,
    seen: u64,
    queue: VecDeque<(u64, f64)>,
}

impl MonotonicWindow {
    fn new(period: usize) -> Self {
        assert!(period > 0, "Period must be greater than 0");
        Self {
            period,
            seen: 0,
            queue: VecDeque::new(),
        }
    }

    /// `dominates(a, b)` is true when `a` makes `b` irrelevant.
    fn push(&mut self, value: f64, dominates: impl Fn(f64, f64) -> bool) {
        let index = self.seen;
        self.seen += 1;

        while let Some(&(_, back)) = self.queue.back() {
            if dominates(value, back) {
                self.queue.pop_back();
            } else {
                break;
            }
        }
        self.queue.push_back((index, value));

        let oldest_kept = self.seen.saturating_sub(self.period as u64);
        while let Some(&(front_index, _)) = self.queue.front() {
            if front_index < oldest_kept {
                self.queue.pop_front();
            } else {
                break;
            }
        }
    }

    fn current(&self) -> Option<f64> {
        if self.seen < self.period as u64 {
            return None;
        }
        self.queue.front().map(|&(_, v)| v)
    }

    fn reset(&mut self) {
        self.seen = 0;
        self.queue.clear();
    }
}

/// Highest value over the last N updates.
#[derive(Debug, Clone)]
pub struct Highest {
    name: String,
    window: MonotonicWindow,
}

impl Highest {
    pub fn new(name: impl Into<String>, period: usize) -> Self {
        Self {
            name: name.into(),
            window: MonotonicWindow::new(period),
        }
    }
}

impl StreamingIndicator for Highest {
    fn update(&mut self, value: f64) -> Option<f64> {
        self.window.push(value, |new, old| new >= old);
        self.window.current()
    }

    fn current(&self) -> Option<f64> {
        self.window.current()
    }

    fn reset(&mut self) {
        self.window.reset();
    }

    fn period(&self) -> usize {
        self.window.period
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn boxed_clone(&self) -> Box<dyn StreamingIndicator> {
        Box::new(self.clone())
    }
}

/// Lowest value over the last N updates.
#[derive(Debug, Clone)]
pub struct Lowest {
    name: String,
    window: MonotonicWindow,
}

impl Lowest {
    pub fn new(name: impl Into<String>, period: usize) -> Self {
        Self {
            name: name.into(),
            window: MonotonicWindow::new(period),
        }
    }
}

impl StreamingIndicator for Lowest {
    fn update(&mut self, value: f64) -> Option<f64> {
        self.window.push(value, |new, old| new <= old);
        self.window.current()
    }

    fn current(&self) -> Option<f64> {
        self.window.current()
    }

    fn reset(&mut self) {
        self.window.reset();
    }

    fn period(&self) -> usize {
        self.window.period
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn boxed_clone(&self) -> Box<dyn StreamingIndicator> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_highest_drops_expired_max() {
        let mut high = Highest::new("hi3", 3);

        assert!(high.update(5.0).is_none());
        assert!(high.update(1.0).is_none());
        assert_eq!(high.update(2.0), Some(5.0));
        // 5.0 leaves the window
        assert_eq!(high.update(1.5), Some(2.0));
        assert_eq!(high.update(0.5), Some(2.0));
        assert_eq!(high.update(0.1), Some(1.5));
    }

    #[test]
    fn test_lowest() {
        let mut low = Lowest::new("lo2", 2);

        assert!(low.update(3.0).is_none());
        assert_eq!(low.update(4.0), Some(3.0));
        assert_eq!(low.update(5.0), Some(4.0));
        assert_eq!(low.update(1.0), Some(1.0));
    }

    proptest! {
        #[test]
        fn extremes_match_window_scan(
            period in 1usize..20,
            data in prop::collection::vec(-500.0f64..500.0, 1..150),
        ) {
            let mut high = Highest::new("hi", period);
            let mut low = Lowest::new("lo", period);
            for (i, value) in data.iter().enumerate() {
                let h = high.update(*value);
                let l = low.update(*value);
                if i + 1 >= period {
                    let window = &data[i + 1 - period..=i];
                    let max = window.iter().cloned().fold(f64::MIN, f64::max);
                    let min = window.iter().cloned().fold(f64::MAX, f64::min);
                    prop_assert_eq!(h, Some(max));
                    prop_assert_eq!(l, Some(min));
                } else {
                    prop_assert!(h.is_none() && l.is_none());
                }
            }
        }
    }
}
