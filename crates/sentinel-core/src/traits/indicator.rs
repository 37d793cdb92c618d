//! Indicator trait definitions.

/// Streaming indicator that maintains internal state.
///
/// Each update costs O(1) (amortised): implementations keep running
/// aggregates over their own period and drop the contribution of the value
/// that falls out of the period instead of recomputing the window.
pub trait StreamingIndicator: Send + Sync {
    /// Update the indicator with a new value.
    ///
    /// # Returns
    /// The current indicator value, or None if not yet ready
    fn update(&mut self, value: f64) -> Option<f64>;

    /// Get the current value without adding new data.
    fn current(&self) -> Option<f64>;

    /// Reset the indicator state.
    fn reset(&mut self);

    /// Check if the indicator has enough data to produce values.
    fn is_ready(&self) -> bool {
        self.current().is_some()
    }

    /// Get the minimum data points required.
    fn period(&self) -> usize;

    /// Get the name of the indicator.
    fn name(&self) -> &str;

    /// Clone into a box, so per-symbol state can be stamped from a template.
    fn boxed_clone(&self) -> Box<dyn StreamingIndicator>;
}

impl std::fmt::Debug for dyn StreamingIndicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingIndicator")
            .field("name", &self.name())
            .field("period", &self.period())
            .field("current", &self.current())
            .finish()
    }
}
