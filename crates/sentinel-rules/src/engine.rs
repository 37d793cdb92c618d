//! Rule registry and evaluation.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use sentinel_core::error::RuleError;
use sentinel_core::types::Signal;
use sentinel_state::{StateDelta, StateInput};

use crate::definition::RuleDefinition;
use crate::interpreter;
use crate::validate::{validate, ValidationContext};

/// A rule plus what it reads, computed once at registration.
#[derive(Debug, Clone)]
pub struct RegisteredRule {
    pub definition: Arc<RuleDefinition>,
    pub inputs: BTreeSet<StateInput>,
}

/// Output of one evaluation pass.
#[derive(Debug, Default)]
pub struct Evaluation {
    /// Fired signals, in rule registration order
    pub signals: Vec<Signal>,
    /// Rules that faulted on this state
    pub errors: Vec<RuleError>,
    /// Rules whose predicate actually ran
    pub evaluated: usize,
}

/// Process-wide rule registry.
///
/// Rules are registered at startup and read-only afterwards; evaluation
/// takes `&self` so one engine can be shared by every shard.
pub struct RuleEngine {
    rules: Vec<RegisteredRule>,
    ids: HashSet<String>,
    ctx: ValidationContext,
}

impl RuleEngine {
    pub fn new(ctx: ValidationContext) -> Self {
        Self {
            rules: Vec::new(),
            ids: HashSet::new(),
            ctx,
        }
    }

    /// Register a rule, validating it against the configured indicators and
    /// window size.
    pub fn register(&mut self, rule: RuleDefinition) -> Result<(), RuleError> {
        if self.ids.contains(&rule.id) {
            return Err(RuleError::DuplicateRuleId(rule.id));
        }
        if rule.id.trim().is_empty() {
            return Err(RuleError::InvalidRule {
                rule_id: rule.id,
                reason: "rule id must not be empty".into(),
            });
        }
        validate(&rule.condition, &self.ctx).map_err(|reason| RuleError::InvalidRule {
            rule_id: rule.id.clone(),
            reason,
        })?;

        let inputs = rule.condition.inputs();
        info!(
            rule_id = %rule.id,
            symbol = %rule.symbol,
            cooldown_secs = rule.cooldown_secs,
            "Registered rule: {}",
            rule.describe()
        );
        self.ids.insert(rule.id.clone());
        self.rules.push(RegisteredRule {
            definition: Arc::new(rule),
            inputs,
        });
        Ok(())
    }

    pub fn register_all(
        &mut self,
        rules: impl IntoIterator<Item = RuleDefinition>,
    ) -> Result<(), RuleError> {
        rules.into_iter().try_for_each(|rule| self.register(rule))
    }

    /// Evaluate every matching rule against the delta's snapshot.
    ///
    /// Rules the delta does not touch are skipped. A rule that faults is
    /// logged and reported in `errors`; the remaining rules still run.
    pub fn evaluate(&self, delta: &StateDelta) -> Evaluation {
        let mut evaluation = Evaluation::default();
        let state = delta.snapshot.as_ref();

        for rule in &self.rules {
            let def = &rule.definition;
            if !def.symbol.matches(&delta.symbol) || !delta.touches_any(rule.inputs.iter()) {
                continue;
            }
            evaluation.evaluated += 1;

            match interpreter::evaluate(&def.condition, state) {
                Ok(true) => {
                    debug!(
                        rule_id = %def.id,
                        symbol = %delta.symbol,
                        sequence = delta.sequence,
                        "Rule fired"
                    );
                    evaluation.signals.push(
                        Signal::new(&def.id, &delta.symbol, delta.timestamp, delta.sequence)
                            .with_description(def.describe())
                            .with_snapshot(state.values()),
                    );
                }
                Ok(false) => {}
                Err(reason) => {
                    warn!(
                        rule_id = %def.id,
                        symbol = %delta.symbol,
                        sequence = delta.sequence,
                        %reason,
                        "Rule evaluation failed"
                    );
                    evaluation.errors.push(RuleError::Evaluation {
                        rule_id: def.id.clone(),
                        symbol: delta.symbol.clone(),
                        reason,
                    });
                }
            }
        }

        evaluation
    }

    pub fn get(&self, id: &str) -> Option<&RuleDefinition> {
        self.rules
            .iter()
            .find(|r| r.definition.id == id)
            .map(|r| r.definition.as_ref())
    }

    /// Registered rules in registration order.
    pub fn rules(&self) -> impl Iterator<Item = &RuleDefinition> {
        self.rules.iter().map(|r| r.definition.as_ref())
    }

    /// Cooldown per rule id.
    pub fn cooldowns(&self) -> HashMap<String, Duration> {
        self.rules
            .iter()
            .map(|r| (r.definition.id.clone(), r.definition.cooldown()))
            .collect()
    }

    /// Message template overrides per rule id.
    pub fn templates(&self) -> HashMap<String, String> {
        self.rules
            .iter()
            .filter_map(|r| {
                r.definition
                    .template
                    .as_ref()
                    .map(|t| (r.definition.id.clone(), t.clone()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{CompareOp, Condition, Value};
    use sentinel_core::types::{Bar, MarketEvent};
    use sentinel_indicators::IndicatorSpec;
    use sentinel_state::InstrumentStateStore;

    fn bar(ts: i64, close: f64) -> Bar {
        Bar::new(ts, close, close + 0.5, close - 0.5, close, 1000.0)
    }

    fn close_above(id: &str, threshold: f64) -> RuleDefinition {
        RuleDefinition::new(
            id,
            "XYZ",
            Condition::compare(Value::close(), CompareOp::Gt, Value::constant(threshold)),
        )
    }

    #[test]
    fn test_duplicate_rule_id() {
        let mut engine = RuleEngine::new(ValidationContext::new(vec![], 3));
        engine.register(close_above("r1", 11.0)).unwrap();

        let err = engine.register(close_above("r1", 12.0)).unwrap_err();
        assert_eq!(err, RuleError::DuplicateRuleId("r1".into()));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_invalid_rule_rejected() {
        let mut engine = RuleEngine::new(ValidationContext::new(vec![], 3));
        let rule = RuleDefinition::new(
            "bad",
            "*",
            Condition::compare(Value::indicator("ma20"), CompareOp::Gt, Value::Price),
        );
        assert!(matches!(
            engine.register(rule),
            Err(RuleError::InvalidRule { .. })
        ));
    }

    #[test]
    fn test_close_threshold_fires_only_on_second_bar() {
        let store = InstrumentStateStore::new(3, vec![]);
        let mut engine = RuleEngine::new(ValidationContext::new(vec![], 3));
        engine.register(close_above("close_gt_11", 11.0)).unwrap();

        let fired: Vec<usize> = [10.0, 12.0, 9.0]
            .iter()
            .enumerate()
            .map(|(i, close)| {
                let event = MarketEvent::bar("XYZ", i as u64 + 1, bar(i as i64 * 1000, *close));
                let delta = store.apply(&event).delta().cloned().unwrap();
                engine.evaluate(&delta).signals.len()
            })
            .collect();

        assert_eq!(fired, vec![0, 1, 0]);
    }

    #[test]
    fn test_faulting_rule_does_not_block_others() {
        let store = InstrumentStateStore::new(3, vec![]);
        let mut engine = RuleEngine::new(ValidationContext::new(vec![], 3));
        let divide_by_zero = Condition::compare(
            Value::Div {
                left: Box::new(Value::close()),
                right: Box::new(Value::Sub {
                    left: Box::new(Value::Price),
                    right: Box::new(Value::close()),
                }),
            },
            CompareOp::Gt,
            Value::constant(0.0),
        );
        engine.register(RuleDefinition::new("broken", "*", divide_by_zero)).unwrap();
        engine.register(close_above("first", 5.0)).unwrap();
        engine.register(close_above("second", 6.0)).unwrap();

        let delta = store
            .apply(&MarketEvent::bar("XYZ", 1, bar(0, 10.0)))
            .delta()
            .cloned()
            .unwrap();
        let evaluation = engine.evaluate(&delta);

        assert_eq!(evaluation.evaluated, 3);
        assert_eq!(evaluation.errors.len(), 1);
        let ids: Vec<&str> = evaluation.signals.iter().map(|s| s.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
        assert_eq!(evaluation.signals[0].value("close"), Some(10.0));
        assert_eq!(evaluation.signals[0].sequence, 1);
    }

    #[test]
    fn test_rules_skip_untouched_inputs() {
        let store = InstrumentStateStore::new(3, vec![IndicatorSpec::sma("ma2", 2)]);
        let mut engine = RuleEngine::new(ValidationContext::new(vec!["ma2".to_string()], 3));
        engine
            .register(RuleDefinition::new(
                "above_ma",
                "*",
                Condition::compare(Value::close(), CompareOp::Gt, Value::indicator("ma2")),
            ))
            .unwrap();
        engine
            .register(RuleDefinition::new(
                "other_symbol",
                "ABC",
                Condition::compare(Value::Price, CompareOp::Gt, Value::constant(0.0)),
            ))
            .unwrap();

        store.apply(&MarketEvent::bar("XYZ", 1, bar(0, 10.0)));
        let tick = store.apply(&MarketEvent::tick("XYZ", 2, 500, 10.2, 1.0));
        let evaluation = engine.evaluate(tick.delta().unwrap());

        assert_eq!(evaluation.evaluated, 0);
        assert!(evaluation.signals.is_empty());
    }
}
