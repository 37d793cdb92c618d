//! Alert dispatcher.
//!
//! Renders a signal and hands it to the notifier, retrying transient
//! failures with exponential backoff up to `max_attempts`. Permanent
//! failures are not retried. Every attempt is logged with the signal id.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use sentinel_core::error::{DeliveryError, NotifyError};
use sentinel_core::traits::Notifier;
use sentinel_core::types::{AlertRecord, DeliveryOutcome, Signal};
use sentinel_core::Backoff;

use crate::template::TemplateSet;

/// Dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Total attempts per signal, including the first
    pub max_attempts: u32,
    /// Delay before retry n is `backoff.delay(n - 1)`
    pub backoff: Backoff,
    /// Upper bound on a single send
    pub attempt_timeout_secs: u64,
    /// Destination passed to the notifier (chat id, channel, ...)
    pub destination: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
            attempt_timeout_secs: 10,
            destination: String::new(),
        }
    }
}

impl DispatcherConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs.max(1))
    }
}

/// Delivers admitted signals through a [`Notifier`].
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    templates: TemplateSet,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, templates: TemplateSet, config: DispatcherConfig) -> Self {
        Self {
            notifier,
            templates,
            config,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Deliver a signal and return its final outcome.
    pub async fn dispatch(&self, signal: &Signal) -> DeliveryOutcome {
        let record = self.deliver(signal).await;
        record.outcome.unwrap_or(DeliveryOutcome::PermanentFailure {
            attempts: record.attempts,
            reason: "no delivery attempted".into(),
            exhausted: true,
        })
    }

    /// Deliver a signal, returning the full alert record.
    pub async fn deliver(&self, signal: &Signal) -> AlertRecord {
        let message = self.templates.render(signal);
        let mut record = AlertRecord::new(
            signal.clone(),
            message,
            self.config.destination.clone(),
        );
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_reason = String::new();

        for attempt in 1..=max_attempts {
            record.attempts = attempt;

            match self.send_once(&record.message).await {
                Ok(()) => {
                    info!(
                        signal_id = %signal.id,
                        rule_id = %signal.rule_id,
                        symbol = %signal.symbol,
                        attempt,
                        notifier = self.notifier.name(),
                        "Alert delivered"
                    );
                    record.finish(DeliveryOutcome::Delivered { attempts: attempt });
                    return record;
                }
                Err(NotifyError::Permanent(reason)) => {
                    error!(
                        signal_id = %signal.id,
                        rule_id = %signal.rule_id,
                        symbol = %signal.symbol,
                        attempt,
                        %reason,
                        "Alert rejected, not retrying"
                    );
                    record.finish(DeliveryOutcome::PermanentFailure {
                        attempts: attempt,
                        reason,
                        exhausted: false,
                    });
                    return record;
                }
                Err(NotifyError::Transient(reason)) => {
                    let err = DeliveryError::Transient {
                        attempt,
                        reason: reason.clone(),
                    };
                    last_reason = reason;

                    if attempt < max_attempts {
                        let delay = self.config.backoff.delay(attempt - 1);
                        warn!(
                            signal_id = %signal.id,
                            rule_id = %signal.rule_id,
                            attempt,
                            retry_in_ms = delay.as_millis() as u64,
                            "{}",
                            err
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        warn!(signal_id = %signal.id, rule_id = %signal.rule_id, attempt, "{}", err);
                    }
                }
            }
        }

        error!(
            signal_id = %signal.id,
            rule_id = %signal.rule_id,
            symbol = %signal.symbol,
            attempts = max_attempts,
            reason = %last_reason,
            "Alert delivery exhausted retries"
        );
        record.finish(DeliveryOutcome::PermanentFailure {
            attempts: max_attempts,
            reason: last_reason,
            exhausted: true,
        });
        record
    }

    /// Send an operational notice (startup, shutdown) under the same retry
    /// policy as alerts.
    pub async fn announce(&self, message: &str) -> DeliveryOutcome {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_reason = String::new();

        for attempt in 1..=max_attempts {
            match self.send_once(message).await {
                Ok(()) => {
                    info!(attempt, notifier = self.notifier.name(), "Notice delivered");
                    return DeliveryOutcome::Delivered { attempts: attempt };
                }
                Err(NotifyError::Permanent(reason)) => {
                    warn!(attempt, %reason, "Notice rejected");
                    return DeliveryOutcome::PermanentFailure {
                        attempts: attempt,
                        reason,
                        exhausted: false,
                    };
                }
                Err(NotifyError::Transient(reason)) => {
                    warn!(attempt, %reason, "Notice not delivered");
                    last_reason = reason;
                    if attempt < max_attempts {
                        tokio::time::sleep(self.config.backoff.delay(attempt - 1)).await;
                    }
                }
            }
        }

        DeliveryOutcome::PermanentFailure {
            attempts: max_attempts,
            reason: last_reason,
            exhausted: true,
        }
    }

    async fn send_once(&self, message: &str) -> Result<(), NotifyError> {
        let send = self.notifier.send(&self.config.destination, message);
        match tokio::time::timeout(self.config.attempt_timeout(), send).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Transient(format!(
                "send timed out after {}s",
                self.config.attempt_timeout().as_secs()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Plays back scripted results, recording every call.
    struct ScriptedNotifier {
        script: Mutex<VecDeque<Result<(), NotifyError>>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedNotifier {
        fn new(script: Vec<Result<(), NotifyError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl Notifier for ScriptedNotifier {
        async fn send(&self, destination: &str, message: &str) -> Result<(), NotifyError> {
            self.calls
                .lock()
                .push((destination.to_string(), message.to_string()));
            self.script.lock().pop_front().unwrap_or(Ok(()))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn dispatcher(notifier: Arc<ScriptedNotifier>, max_attempts: u32) -> Dispatcher {
        Dispatcher::new(
            notifier,
            TemplateSet::new("{rule_id} on {symbol}", Default::default()),
            DispatcherConfig {
                max_attempts,
                backoff: Backoff::exponential(
                    Duration::from_millis(100),
                    2.0,
                    Duration::from_secs(5),
                ),
                attempt_timeout_secs: 10,
                destination: "chat-1".into(),
            },
        )
    }

    fn transient() -> Result<(), NotifyError> {
        Err(NotifyError::Transient("connection reset".into()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_transient_exhausts_after_three_attempts() {
        let notifier = ScriptedNotifier::new(vec![transient(), transient(), transient()]);
        let dispatcher = dispatcher(Arc::clone(&notifier), 3);

        let started = tokio::time::Instant::now();
        let outcome = dispatcher.dispatch(&Signal::new("r1", "XYZ", 0, 1)).await;

        assert_eq!(
            outcome,
            DeliveryOutcome::PermanentFailure {
                attempts: 3,
                reason: "connection reset".into(),
                exhausted: true,
            }
        );
        assert_eq!(notifier.calls(), 3);
        // 100ms + 200ms of backoff between the three attempts
        assert_eq!(started.elapsed(), Duration::from_millis(300));
        assert!(outcome.into_result().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_then_success() {
        let notifier = ScriptedNotifier::new(vec![transient(), Ok(())]);
        let dispatcher = dispatcher(Arc::clone(&notifier), 3);

        let record = dispatcher.deliver(&Signal::new("r1", "XYZ", 0, 1)).await;
        assert_eq!(record.outcome, Some(DeliveryOutcome::Delivered { attempts: 2 }));
        assert_eq!(record.attempts, 2);
        assert_eq!(record.message, "r1 on XYZ");
        assert_eq!(notifier.calls.lock()[0].0, "chat-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_not_retried() {
        let notifier = ScriptedNotifier::new(vec![Err(NotifyError::Permanent(
            "chat not found".into(),
        ))]);
        let dispatcher = dispatcher(Arc::clone(&notifier), 5);

        let outcome = dispatcher.dispatch(&Signal::new("r1", "XYZ", 0, 1)).await;
        assert_eq!(
            outcome,
            DeliveryOutcome::PermanentFailure {
                attempts: 1,
                reason: "chat not found".into(),
                exhausted: false,
            }
        );
        assert_eq!(notifier.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_send_times_out_as_transient() {
        struct Hang;

        #[async_trait]
        impl Notifier for Hang {
            async fn send(&self, _: &str, _: &str) -> Result<(), NotifyError> {
                std::future::pending().await
            }

            fn name(&self) -> &str {
                "hang"
            }
        }

        let dispatcher = Dispatcher::new(
            Arc::new(Hang),
            TemplateSet::default(),
            DispatcherConfig {
                max_attempts: 2,
                ..Default::default()
            },
        );
        let outcome = dispatcher.dispatch(&Signal::new("r1", "XYZ", 0, 1)).await;
        match outcome {
            DeliveryOutcome::PermanentFailure {
                attempts, exhausted, reason,
            } => {
                assert_eq!(attempts, 2);
                assert!(exhausted);
                assert!(reason.contains("timed out"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_announce_sends_verbatim_with_retry() {
        let notifier = ScriptedNotifier::new(vec![transient(), Ok(())]);
        let dispatcher = dispatcher(Arc::clone(&notifier), 3);

        let outcome = dispatcher.announce("Sentinel started").await;
        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 2 });
        assert_eq!(
            notifier.calls.lock()[1],
            ("chat-1".to_string(), "Sentinel started".to_string())
        );
    }
}
