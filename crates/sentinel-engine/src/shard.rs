//! Per-symbol shard worker.
//!
//! Each symbol hashes to exactly one shard, so a shard is the single writer
//! for its symbols and applies their events in arrival order.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use sentinel_alerts::{Admission, AlertQueue, Deduplicator, PushOutcome};
use sentinel_core::types::{MarketEvent, Signal};
use sentinel_monitor::PipelineMetrics;
use sentinel_rules::RuleEngine;
use sentinel_state::{ApplyOutcome, InstrumentStateStore};

/// Shard index for a symbol.
pub fn shard_for(symbol: &str, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    symbol.hash(&mut hasher);
    (hasher.finish() % shards.max(1) as u64) as usize
}

#[derive(Clone)]
pub(crate) struct Shard {
    pub id: usize,
    pub store: Arc<InstrumentStateStore>,
    pub rules: Arc<RuleEngine>,
    pub dedup: Arc<Deduplicator>,
    pub queue: Arc<AlertQueue<Signal>>,
    pub metrics: Arc<PipelineMetrics>,
    pub prune_every: u64,
}

impl Shard {
    pub async fn run(self, mut rx: mpsc::Receiver<MarketEvent>) {
        let mut applied: u64 = 0;
        while let Some(event) = rx.recv().await {
            if !self.process(&event) {
                continue;
            }
            applied += 1;
            if applied % self.prune_every == 0 {
                // This shard is the only writer for the symbol, so its last
                // applied timestamp is the symbol's current clock
                let pruned = self.dedup.prune(&event.symbol, event.timestamp);
                debug!(shard = self.id, symbol = %event.symbol, pruned, "Pruned cooldown entries");
            }
        }
        debug!(shard = self.id, "Shard drained");
    }

    /// Apply one event, evaluate the rules it touches and queue admitted
    /// signals. Returns whether the event was applied.
    pub fn process(&self, event: &MarketEvent) -> bool {
        let delta = match self.store.apply(event) {
            ApplyOutcome::Applied(delta) => delta,
            ApplyOutcome::Stale { last_applied } => {
                self.metrics.events_stale.inc();
                debug!(
                    symbol = %event.symbol,
                    sequence = event.sequence,
                    last_applied,
                    "Stale event dropped"
                );
                return false;
            }
            ApplyOutcome::Ignored => return false,
        };
        self.metrics.events_applied.inc();

        let evaluation = self.rules.evaluate(&delta);
        self.metrics.rule_errors.add(evaluation.errors.len() as u64);

        for signal in evaluation.signals {
            self.metrics.signals_fired.inc();
            match self.dedup.admit(&signal) {
                Admission::Admitted => {
                    self.metrics.signals_admitted.inc();
                    self.enqueue(signal);
                }
                Admission::Suppressed { .. } => self.metrics.signals_suppressed.inc(),
            }
        }
        true
    }

    fn enqueue(&self, signal: Signal) {
        match self.queue.push(signal) {
            PushOutcome::Queued => {}
            PushOutcome::DroppedOldest(old) => {
                self.metrics.alerts_dropped.inc();
                warn!(
                    signal_id = %old.id,
                    rule_id = %old.rule_id,
                    symbol = %old.symbol,
                    "Alert queue full, dropped oldest signal"
                );
            }
            PushOutcome::Closed(signal) => {
                self.metrics.alerts_dropped.inc();
                warn!(signal_id = %signal.id, "Alert queue closed, signal dropped");
            }
        }
    }
}
