//! Evaluates conditions against an instrument snapshot.
//!
//! Evaluation is three-valued: `Ok(None)` means some input is not available
//! yet (indicator warming up, too few bars) and never fires. `Err` is a real
//! fault in the expression for this state, such as a division by zero.

use sentinel_state::InstrumentState;

use crate::expr::{Condition, Value};

pub type EvalResult<T> = Result<Option<T>, String>;

/// Evaluate a condition; missing data is `false`.
pub fn evaluate(condition: &Condition, state: &InstrumentState) -> Result<bool, String> {
    Ok(eval_condition(condition, state)?.unwrap_or(false))
}

/// Evaluate one operand against the current state.
pub fn value_of(value: &Value, state: &InstrumentState) -> EvalResult<f64> {
    View::current(state).value(value)
}

fn eval_condition(condition: &Condition, state: &InstrumentState) -> EvalResult<bool> {
    match condition {
        Condition::Compare { left, cmp, right } => {
            let view = View::current(state);
            let (Some(l), Some(r)) = (view.value(left)?, view.value(right)?) else {
                return Ok(None);
            };
            Ok(Some(cmp.apply(l, r)))
        }
        Condition::CrossesAbove { left, right } => {
            let Some((before, now)) = spreads(state, left, right)? else {
                return Ok(None);
            };
            Ok(Some(before <= 0.0 && now > 0.0))
        }
        Condition::CrossesBelow { left, right } => {
            let Some((before, now)) = spreads(state, left, right)? else {
                return Ok(None);
            };
            Ok(Some(before >= 0.0 && now < 0.0))
        }
        Condition::All { conditions } => {
            let mut undetermined = false;
            for condition in conditions {
                match eval_condition(condition, state)? {
                    Some(false) => return Ok(Some(false)),
                    Some(true) => {}
                    None => undetermined = true,
                }
            }
            Ok(if undetermined { None } else { Some(true) })
        }
        Condition::Any { conditions } => {
            let mut undetermined = false;
            for condition in conditions {
                match eval_condition(condition, state)? {
                    Some(true) => return Ok(Some(true)),
                    Some(false) => {}
                    None => undetermined = true,
                }
            }
            Ok(if undetermined { None } else { Some(false) })
        }
        Condition::Not { condition } => Ok(eval_condition(condition, state)?.map(|b| !b)),
    }
}

/// `left - right` before and after the last update.
fn spreads(state: &InstrumentState, left: &Value, right: &Value) -> EvalResult<(f64, f64)> {
    let now = View::current(state);
    let before = now.prior();

    let values = (
        before.value(left)?,
        before.value(right)?,
        now.value(left)?,
        now.value(right)?,
    );
    let (Some(bl), Some(br), Some(nl), Some(nr)) = values else {
        return Ok(None);
    };
    Ok(Some((bl - br, nl - nr)))
}

/// A read position in the state: the current frame or the one before it.
#[derive(Clone, Copy)]
struct View<'a> {
    state: &'a InstrumentState,
    back: usize,
}

impl<'a> View<'a> {
    fn current(state: &'a InstrumentState) -> Self {
        Self { state, back: 0 }
    }

    fn prior(self) -> Self {
        Self {
            state: self.state,
            back: self.back + 1,
        }
    }

    /// Bars only shift when the last update was a bar close.
    fn bar_offset(&self) -> usize {
        if self.back > 0 && self.state.last_event_was_bar() {
            self.back
        } else {
            0
        }
    }

    fn frame(&self) -> Option<&'a sentinel_state::Frame> {
        match self.back {
            0 => Some(&self.state.current),
            1 => Some(&self.state.previous),
            _ => None,
        }
    }

    fn value(&self, value: &Value) -> EvalResult<f64> {
        let result = match value {
            Value::Const { value } => Some(*value),
            Value::Price => self.frame().and_then(|f| f.price),
            Value::Volume => self.frame().and_then(|f| f.volume),
            Value::Bar { field, ago } => self
                .state
                .bars
                .ago(ago + self.bar_offset())
                .map(|bar| bar.field(*field)),
            Value::Indicator { name } => self.frame().and_then(|f| f.indicator(name)),
            Value::Change { field, periods } => {
                let offset = self.bar_offset();
                let bars = &self.state.bars;
                let (Some(latest), Some(base)) = (bars.ago(offset), bars.ago(offset + periods))
                else {
                    return Ok(None);
                };
                let base = base.field(*field);
                if base == 0.0 {
                    return Err(format!("division by zero in {}", value));
                }
                Some((latest.field(*field) - base) / base * 100.0)
            }
            Value::Prior { value } => return self.prior().value(value),
            Value::Add { left, right } => self.binary(left, right, |l, r| Ok(l + r))?,
            Value::Sub { left, right } => self.binary(left, right, |l, r| Ok(l - r))?,
            Value::Mul { left, right } => self.binary(left, right, |l, r| Ok(l * r))?,
            Value::Div { left, right } => self.binary(left, right, |l, r| {
                if r == 0.0 {
                    Err(format!("division by zero in {}", value))
                } else {
                    Ok(l / r)
                }
            })?,
        };

        match result {
            Some(v) if !v.is_finite() => Err(format!("non-finite result for {}", value)),
            other => Ok(other),
        }
    }

    fn binary(
        &self,
        left: &Value,
        right: &Value,
        op: impl Fn(f64, f64) -> Result<f64, String>,
    ) -> EvalResult<f64> {
        match (self.value(left)?, self.value(right)?) {
            (Some(l), Some(r)) => op(l, r).map(Some),
            _ => Ok(None),
        }
    }
}
