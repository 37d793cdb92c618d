//! Pipeline wiring.
//!
//! One ingress task normalizes raw messages and routes market events to the
//! shard owning their symbol. Shards push admitted signals into a bounded
//! drop-oldest queue; a single dispatcher task drains it, so slow or retried
//! deliveries never hold up evaluation.
//!
//! Shutdown is driven by the raw message channel: once every sender is gone
//! the shards drain, the alert queue closes and the dispatcher delivers what
//! is left.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use sentinel_alerts::{AlertQueue, Deduplicator, Dispatcher};
use sentinel_core::types::{MarketEvent, Signal};
use sentinel_feed::{Normalizer, SupervisorHandle};
use sentinel_indicators::IndicatorSpec;
use sentinel_monitor::{MetricsSnapshot, PipelineMetrics};
use sentinel_rules::RuleEngine;
use sentinel_state::InstrumentStateStore;

use crate::shard::{shard_for, Shard};

/// Pipeline sizing.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub window_capacity: usize,
    pub shards: usize,
    pub shard_queue: usize,
    pub alert_queue: usize,
    /// Cooldown for rules without one
    pub default_cooldown: Duration,
    /// Each shard prunes expired cooldowns of the symbol it just applied
    /// every this many applied events
    pub prune_every: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_capacity: 50,
            shards: 4,
            shard_queue: 1024,
            alert_queue: 256,
            default_cooldown: Duration::from_secs(300),
            prune_every: 10_000,
        }
    }
}

/// The assembled alert pipeline.
pub struct Pipeline {
    store: Arc<InstrumentStateStore>,
    rules: Arc<RuleEngine>,
    dedup: Arc<Deduplicator>,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<PipelineMetrics>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        rules: RuleEngine,
        indicators: Vec<IndicatorSpec>,
        dispatcher: Dispatcher,
        config: PipelineConfig,
    ) -> Self {
        let dedup = Deduplicator::new(rules.cooldowns(), config.default_cooldown);
        Self {
            store: Arc::new(InstrumentStateStore::new(config.window_capacity, indicators)),
            rules: Arc::new(rules),
            dedup: Arc::new(dedup),
            dispatcher: Arc::new(dispatcher),
            metrics: Arc::new(PipelineMetrics::new()),
            config,
        }
    }

    pub fn store(&self) -> &InstrumentStateStore {
        &self.store
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn deduplicator(&self) -> &Deduplicator {
        &self.dedup
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Process raw messages until the channel closes, then drain and return
    /// the final counters.
    pub async fn run(
        &self,
        mut raw: mpsc::Receiver<String>,
        supervisor: Option<&SupervisorHandle>,
    ) -> MetricsSnapshot {
        let shard_count = self.config.shards.max(1);
        info!(
            shards = shard_count,
            rules = self.rules.len(),
            indicators = self.store.indicator_specs().len(),
            "Pipeline started"
        );

        let queue = Arc::new(AlertQueue::new(self.config.alert_queue));
        let dispatch_task = self.spawn_dispatcher(Arc::clone(&queue));

        let mut senders = Vec::with_capacity(shard_count);
        let mut shard_tasks = Vec::with_capacity(shard_count);
        for id in 0..shard_count {
            let (tx, rx) = mpsc::channel(self.config.shard_queue.max(1));
            let shard = Shard {
                id,
                store: Arc::clone(&self.store),
                rules: Arc::clone(&self.rules),
                dedup: Arc::clone(&self.dedup),
                queue: Arc::clone(&queue),
                metrics: Arc::clone(&self.metrics),
                prune_every: self.config.prune_every.max(1),
            };
            senders.push(tx);
            shard_tasks.push(tokio::spawn(shard.run(rx)));
        }

        let mut normalizer = Normalizer::new();
        while let Some(message) = raw.recv().await {
            self.metrics.events_received.inc();

            let normalized = match normalizer.normalize_str(&message) {
                Ok(normalized) => normalized,
                Err(e) => {
                    self.metrics.events_malformed.inc();
                    warn!(error = %e, "Malformed event dropped");
                    continue;
                }
            };
            if let Some(gap) = &normalized.gap {
                self.metrics.sequence_gaps.inc();
                self.metrics.missing_events.add(gap.missing_events());
            }

            let event = normalized.event;
            if event.is_connection() {
                info!(kind = %event.kind(), "Feed connection event");
                if let Some(supervisor) = supervisor {
                    supervisor.on_event(&event).await;
                }
                continue;
            }

            self.route(&senders, event).await;
        }

        debug!("Ingress closed, draining shards");
        drop(senders);
        join_all("shard", shard_tasks).await;

        queue.close();
        join_all("dispatcher", vec![dispatch_task]).await;

        if let Some(supervisor) = supervisor {
            self.metrics
                .reconnect_attempts
                .set(supervisor.stats().reconnect_attempts());
        }

        let snapshot = self.metrics.snapshot();
        info!(
            received = snapshot.events_received,
            admitted = snapshot.signals_admitted,
            delivered = snapshot.alerts_delivered,
            "Pipeline stopped"
        );
        snapshot
    }

    async fn route(&self, senders: &[mpsc::Sender<MarketEvent>], event: MarketEvent) {
        let shard = shard_for(&event.symbol, senders.len());
        if senders[shard].send(event).await.is_err() {
            error!(shard, "Shard stopped, event dropped");
        }
    }

    fn spawn_dispatcher(&self, queue: Arc<AlertQueue<Signal>>) -> JoinHandle<()> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let metrics = Arc::clone(&self.metrics);

        tokio::spawn(async move {
            while let Some(signal) = queue.pop().await {
                let record = dispatcher.deliver(&signal).await;
                match record.outcome {
                    Some(outcome) if outcome.is_delivered() => metrics.alerts_delivered.inc(),
                    _ => metrics.alerts_failed.inc(),
                }
            }
            debug!("Dispatcher drained");
        })
    }
}

async fn join_all(name: &str, tasks: Vec<JoinHandle<()>>) {
    for task in tasks {
        if let Err(e) = task.await {
            error!(task = name, error = %e, "Pipeline task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_alerts::{DispatcherConfig, LogNotifier, TemplateSet};
    use sentinel_rules::{CompareOp, Condition, RuleDefinition, ValidationContext, Value};

    fn pipeline(alert_queue: usize) -> Pipeline {
        let mut rules = RuleEngine::new(ValidationContext::new(Vec::new(), 3));
        rules
            .register(RuleDefinition::new(
                "close_above_11",
                "XYZ",
                Condition::compare(Value::close(), CompareOp::Gt, Value::constant(11.0)),
            ))
            .unwrap();

        Pipeline::new(
            rules,
            Vec::new(),
            Dispatcher::new(
                Arc::new(LogNotifier::new()),
                TemplateSet::default(),
                DispatcherConfig::default(),
            ),
            PipelineConfig {
                window_capacity: 3,
                shards: 2,
                alert_queue,
                ..Default::default()
            },
        )
    }

    fn bar(seq: u64, close: f64) -> String {
        format!(
            r#"{{"type":"bar","symbol":"XYZ","open":{c},"high":{c},"low":{c},"close":{c},"seq":{seq},"ts":{ts}}}"#,
            c = close,
            seq = seq,
            ts = seq * 60_000
        )
    }

    #[tokio::test]
    async fn test_counts_through_pipeline() {
        let pipeline = pipeline(16);
        let (tx, rx) = mpsc::channel(16);
        for message in [bar(1, 10.0), bar(2, 12.0), bar(2, 12.0), "garbage".into(), bar(5, 9.0)] {
            tx.send(message).await.unwrap();
        }
        drop(tx);

        let snapshot = pipeline.run(rx, None).await;
        assert_eq!(snapshot.events_received, 5);
        assert_eq!(snapshot.events_malformed, 1);
        assert_eq!(snapshot.events_stale, 1);
        assert_eq!(snapshot.events_applied, 3);
        assert_eq!(snapshot.sequence_gaps, 1);
        assert_eq!(snapshot.missing_events, 2);
        assert_eq!(snapshot.signals_fired, 1);
        assert_eq!(snapshot.alerts_delivered, 1);
        assert_eq!(pipeline.store().last_sequence("XYZ"), Some(5));
    }
}
