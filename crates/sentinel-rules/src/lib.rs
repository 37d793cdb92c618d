//! Rule engine.
//!
//! Rules are data: a [`Condition`] expression tree evaluated by an explicit
//! interpreter against an instrument snapshot. This crate provides:
//! - The expression types and their serde form
//! - The interpreter (missing data never fires, arithmetic faults are errors)
//! - Static validation run at registration
//! - The [`RuleEngine`] registry, evaluated in registration order
//! - Built-in presets (MA crossover, volume spike, breakout)

pub mod definition;
pub mod engine;
pub mod expr;
pub mod interpreter;
pub mod presets;
pub mod validate;

pub use definition::{RuleDefinition, SymbolFilter};
pub use engine::{Evaluation, RegisteredRule, RuleEngine};
pub use expr::{CompareOp, Condition, Value};
pub use presets::{PresetExpansion, PresetInfo, PresetRegistry};
pub use validate::ValidationContext;
