//! Static checks run when a rule is registered.

use std::collections::BTreeSet;

use crate::expr::{Condition, Value};

/// What the state store will make available to rules.
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    pub indicators: BTreeSet<String>,
    pub window_capacity: usize,
}

impl ValidationContext {
    pub fn new(indicators: impl IntoIterator<Item = String>, window_capacity: usize) -> Self {
        Self {
            indicators: indicators.into_iter().collect(),
            window_capacity,
        }
    }
}

/// Check a condition against the context.
pub fn validate(condition: &Condition, ctx: &ValidationContext) -> Result<(), String> {
    check_condition(condition, ctx)?;
    if condition.inputs().is_empty() {
        return Err("condition does not read any market data".into());
    }
    Ok(())
}

fn check_condition(condition: &Condition, ctx: &ValidationContext) -> Result<(), String> {
    match condition {
        Condition::Compare { left, right, .. } => {
            check_value(left, ctx, 0)?;
            check_value(right, ctx, 0)
        }
        // Crossings also read the state one update back.
        Condition::CrossesAbove { left, right } | Condition::CrossesBelow { left, right } => {
            check_value(left, ctx, 1)?;
            check_value(right, ctx, 1)
        }
        Condition::All { conditions } | Condition::Any { conditions } => {
            if conditions.is_empty() {
                return Err("all/any needs at least one condition".into());
            }
            conditions.iter().try_for_each(|c| check_condition(c, ctx))
        }
        Condition::Not { condition } => check_condition(condition, ctx),
    }
}

/// `back` is how many updates before the current one the operand may be read at.
fn check_value(value: &Value, ctx: &ValidationContext, back: usize) -> Result<(), String> {
    match value {
        Value::Const { value } => {
            if !value.is_finite() {
                return Err(format!("constant {} is not finite", value));
            }
        }
        Value::Price | Value::Volume => check_frame_depth(value, back)?,
        Value::Indicator { name } => {
            check_frame_depth(value, back)?;
            if !ctx.indicators.contains(name) {
                return Err(format!("unknown indicator '{}'", name));
            }
        }
        Value::Bar { ago, .. } => {
            if ago + back >= ctx.window_capacity {
                return Err(format!(
                    "{} reaches {} bars back but the window holds {}",
                    value,
                    ago + back,
                    ctx.window_capacity
                ));
            }
        }
        Value::Change { periods, .. } => {
            if *periods == 0 {
                return Err(format!("{} needs at least one period", value));
            }
            if periods + back >= ctx.window_capacity {
                return Err(format!(
                    "{} reaches {} bars back but the window holds {}",
                    value,
                    periods + back,
                    ctx.window_capacity
                ));
            }
        }
        Value::Prior { value } => check_value(value, ctx, back + 1)?,
        Value::Add { left, right }
        | Value::Sub { left, right }
        | Value::Mul { left, right }
        | Value::Div { left, right } => {
            check_value(left, ctx, back)?;
            check_value(right, ctx, back)?;
        }
    }
    Ok(())
}

fn check_frame_depth(value: &Value, back: usize) -> Result<(), String> {
    if back > 1 {
        return Err(format!("{} can only be read one update back", value));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::CompareOp;
    use sentinel_core::types::BarField;

    fn ctx() -> ValidationContext {
        ValidationContext::new(vec!["ma20".to_string()], 3)
    }

    #[test]
    fn test_valid_rules() {
        let threshold = Condition::compare(Value::close(), CompareOp::Gt, Value::constant(11.0));
        assert!(validate(&threshold, &ctx()).is_ok());

        let cross = Condition::crosses_above(Value::close(), Value::indicator("ma20"));
        assert!(validate(&cross, &ctx()).is_ok());
    }

    #[test]
    fn test_unknown_indicator() {
        let rule = Condition::compare(Value::Price, CompareOp::Gt, Value::indicator("ma50"));
        let err = validate(&rule, &ctx()).unwrap_err();
        assert!(err.contains("ma50"));
    }

    #[test]
    fn test_lookback_exceeds_window() {
        let rule = Condition::compare(Value::bar(BarField::Close, 3), CompareOp::Gt, Value::Price);
        assert!(validate(&rule, &ctx()).is_err());

        // ago 2 fits, but a crossing needs one more bar
        let rule = Condition::crosses_above(Value::bar(BarField::Close, 2), Value::constant(1.0));
        assert!(validate(&rule, &ctx()).is_err());
    }

    #[test]
    fn test_structural_errors() {
        assert!(validate(&Condition::all(vec![]), &ctx()).is_err());

        let constants = Condition::compare(Value::constant(1.0), CompareOp::Lt, Value::constant(2.0));
        assert!(validate(&constants, &ctx()).is_err());

        let nan = Condition::compare(Value::Price, CompareOp::Lt, Value::constant(f64::NAN));
        assert!(validate(&nan, &ctx()).is_err());

        let too_deep = Condition::crosses_above(Value::prior(Value::Price), Value::constant(1.0));
        assert!(validate(&too_deep, &ctx()).is_err());
    }
}
