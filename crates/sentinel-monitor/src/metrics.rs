//! Pipeline counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Monotonic counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.add(1);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    /// Overwrite with a value tracked elsewhere.
    pub fn set(&self, n: u64) {
        self.0.store(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counters shared by every pipeline stage.
#[derive(Debug)]
pub struct PipelineMetrics {
    pub events_received: Counter,
    pub events_malformed: Counter,
    pub sequence_gaps: Counter,
    pub missing_events: Counter,
    pub events_stale: Counter,
    pub events_applied: Counter,
    pub signals_fired: Counter,
    pub signals_admitted: Counter,
    pub signals_suppressed: Counter,
    pub rule_errors: Counter,
    pub alerts_delivered: Counter,
    pub alerts_failed: Counter,
    pub alerts_dropped: Counter,
    pub reconnect_attempts: Counter,
    started: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            events_received: Counter::default(),
            events_malformed: Counter::default(),
            sequence_gaps: Counter::default(),
            missing_events: Counter::default(),
            events_stale: Counter::default(),
            events_applied: Counter::default(),
            signals_fired: Counter::default(),
            signals_admitted: Counter::default(),
            signals_suppressed: Counter::default(),
            rule_errors: Counter::default(),
            alerts_delivered: Counter::default(),
            alerts_failed: Counter::default(),
            alerts_dropped: Counter::default(),
            reconnect_attempts: Counter::default(),
            started: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            events_received: self.events_received.get(),
            events_malformed: self.events_malformed.get(),
            sequence_gaps: self.sequence_gaps.get(),
            missing_events: self.missing_events.get(),
            events_stale: self.events_stale.get(),
            events_applied: self.events_applied.get(),
            signals_fired: self.signals_fired.get(),
            signals_admitted: self.signals_admitted.get(),
            signals_suppressed: self.signals_suppressed.get(),
            rule_errors: self.rule_errors.get(),
            alerts_delivered: self.alerts_delivered.get(),
            alerts_failed: self.alerts_failed.get(),
            alerts_dropped: self.alerts_dropped.get(),
            reconnect_attempts: self.reconnect_attempts.get(),
        }
    }
}

/// Point-in-time copy of [`PipelineMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub events_received: u64,
    pub events_malformed: u64,
    pub sequence_gaps: u64,
    pub missing_events: u64,
    pub events_stale: u64,
    pub events_applied: u64,
    pub signals_fired: u64,
    pub signals_admitted: u64,
    pub signals_suppressed: u64,
    pub rule_errors: u64,
    pub alerts_delivered: u64,
    pub alerts_failed: u64,
    pub alerts_dropped: u64,
    pub reconnect_attempts: u64,
}

impl MetricsSnapshot {
    /// Log the final statistics.
    pub fn log_summary(&self) {
        info!(
            uptime_secs = self.uptime_secs,
            received = self.events_received,
            malformed = self.events_malformed,
            gaps = self.sequence_gaps,
            stale = self.events_stale,
            applied = self.events_applied,
            "Event statistics"
        );
        info!(
            fired = self.signals_fired,
            admitted = self.signals_admitted,
            suppressed = self.signals_suppressed,
            rule_errors = self.rule_errors,
            delivered = self.alerts_delivered,
            failed = self.alerts_failed,
            dropped = self.alerts_dropped,
            reconnects = self.reconnect_attempts,
            "Alert statistics"
        );
    }
}
