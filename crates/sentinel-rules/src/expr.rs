//! Rule expressions.
//!
//! Rules are data: a [`Condition`] tree over [`Value`] operands. Both are
//! serde-tagged so they can be written directly in configuration:
//!
//! ```toml
//! [rules.condition]
//! op = "crosses_above"
//! left = { type = "bar", field = "close" }
//! right = { type = "indicator", name = "ma20" }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use sentinel_core::types::BarField;
use sentinel_state::StateInput;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    #[serde(alias = ">")]
    Gt,
    #[serde(alias = ">=")]
    Ge,
    #[serde(alias = "<")]
    Lt,
    #[serde(alias = "<=")]
    Le,
    #[serde(alias = "==")]
    Eq,
    #[serde(alias = "!=")]
    Ne,
}

impl CompareOp {
    pub fn apply(self, left: f64, right: f64) -> bool {
        match self {
            CompareOp::Gt => left > right,
            CompareOp::Ge => left >= right,
            CompareOp::Lt => left < right,
            CompareOp::Le => left <= right,
            CompareOp::Eq => left == right,
            CompareOp::Ne => left != right,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
        };
        write!(f, "{}", s)
    }
}

/// A numeric operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Value {
    Const {
        value: f64,
    },
    /// Last traded price (tick price or bar close)
    Price,
    /// Volume of the last tick or bar
    Volume,
    /// A field of the bar `ago` bars back (0 = newest)
    Bar {
        #[serde(default)]
        field: BarField,
        #[serde(default)]
        ago: usize,
    },
    Indicator {
        name: String,
    },
    /// Percent change of a bar field over `periods` bars
    Change {
        #[serde(default)]
        field: BarField,
        periods: usize,
    },
    /// The operand as it was before the last update
    Prior {
        value: Box<Value>,
    },
    Add {
        left: Box<Value>,
        right: Box<Value>,
    },
    Sub {
        left: Box<Value>,
        right: Box<Value>,
    },
    Mul {
        left: Box<Value>,
        right: Box<Value>,
    },
    Div {
        left: Box<Value>,
        right: Box<Value>,
    },
}

impl Value {
    pub fn constant(value: f64) -> Self {
        Value::Const { value }
    }

    pub fn close() -> Self {
        Value::Bar {
            field: BarField::Close,
            ago: 0,
        }
    }

    pub fn bar(field: BarField, ago: usize) -> Self {
        Value::Bar { field, ago }
    }

    pub fn indicator(name: impl Into<String>) -> Self {
        Value::Indicator { name: name.into() }
    }

    pub fn prior(value: Value) -> Self {
        Value::Prior {
            value: Box::new(value),
        }
    }

    pub fn mul(left: Value, right: Value) -> Self {
        Value::Mul {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// State inputs this operand reads.
    pub fn collect_inputs(&self, inputs: &mut BTreeSet<StateInput>) {
        match self {
            Value::Const { .. } => {}
            Value::Price => {
                inputs.insert(StateInput::Price);
            }
            Value::Volume => {
                inputs.insert(StateInput::Volume);
            }
            Value::Bar { .. } | Value::Change { .. } => {
                inputs.insert(StateInput::Bars);
            }
            Value::Indicator { name } => {
                inputs.insert(StateInput::Indicator(name.clone()));
            }
            Value::Prior { value } => value.collect_inputs(inputs),
            Value::Add { left, right }
            | Value::Sub { left, right }
            | Value::Mul { left, right }
            | Value::Div { left, right } => {
                left.collect_inputs(inputs);
                right.collect_inputs(inputs);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Const { value } => write!(f, "{}", value),
            Value::Price => write!(f, "price"),
            Value::Volume => write!(f, "volume"),
            Value::Bar { field, ago: 0 } => write!(f, "{}", field),
            Value::Bar { field, ago } => write!(f, "{}[{}]", field, ago),
            Value::Indicator { name } => write!(f, "{}", name),
            Value::Change { field, periods } => write!(f, "change({}, {})", field, periods),
            Value::Prior { value } => write!(f, "prior({})", value),
            Value::Add { left, right } => write!(f, "({} + {})", left, right),
            Value::Sub { left, right } => write!(f, "({} - {})", left, right),
            Value::Mul { left, right } => write!(f, "({} * {})", left, right),
            Value::Div { left, right } => write!(f, "({} / {})", left, right),
        }
    }
}

/// A boolean predicate over instrument state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    Compare {
        left: Value,
        cmp: CompareOp,
        right: Value,
    },
    /// `left` was at or below `right` before the update and is above it now
    CrossesAbove {
        left: Value,
        right: Value,
    },
    /// `left` was at or above `right` before the update and is below it now
    CrossesBelow {
        left: Value,
        right: Value,
    },
    All {
        conditions: Vec<Condition>,
    },
    Any {
        conditions: Vec<Condition>,
    },
    Not {
        condition: Box<Condition>,
    },
}

impl Condition {
    pub fn compare(left: Value, cmp: CompareOp, right: Value) -> Self {
        Condition::Compare { left, cmp, right }
    }

    pub fn crosses_above(left: Value, right: Value) -> Self {
        Condition::CrossesAbove { left, right }
    }

    pub fn crosses_below(left: Value, right: Value) -> Self {
        Condition::CrossesBelow { left, right }
    }

    pub fn all(conditions: Vec<Condition>) -> Self {
        Condition::All { conditions }
    }

    pub fn any(conditions: Vec<Condition>) -> Self {
        Condition::Any { conditions }
    }

    pub fn negate(condition: Condition) -> Self {
        Condition::Not {
            condition: Box::new(condition),
        }
    }

    /// Every state input the condition reads.
    pub fn inputs(&self) -> BTreeSet<StateInput> {
        let mut inputs = BTreeSet::new();
        self.collect_inputs(&mut inputs);
        inputs
    }

    fn collect_inputs(&self, inputs: &mut BTreeSet<StateInput>) {
        match self {
            Condition::Compare { left, right, .. }
            | Condition::CrossesAbove { left, right }
            | Condition::CrossesBelow { left, right } => {
                left.collect_inputs(inputs);
                right.collect_inputs(inputs);
            }
            Condition::All { conditions } | Condition::Any { conditions } => {
                for condition in conditions {
                    condition.collect_inputs(inputs);
                }
            }
            Condition::Not { condition } => condition.collect_inputs(inputs),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Compare { left, cmp, right } => write!(f, "{} {} {}", left, cmp, right),
            Condition::CrossesAbove { left, right } => {
                write!(f, "{} crosses above {}", left, right)
            }
            Condition::CrossesBelow { left, right } => {
                write!(f, "{} crosses below {}", left, right)
            }
            Condition::All { conditions } => write_joined(f, conditions, " and "),
            Condition::Any { conditions } => write_joined(f, conditions, " or "),
            Condition::Not { condition } => write!(f, "not ({})", condition),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, conditions: &[Condition], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, condition) in conditions.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", condition)?;
    }
    write!(f, ")")
}
