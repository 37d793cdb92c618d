//! CLI command implementations.

pub mod rules;
pub mod run;
pub mod validate;
