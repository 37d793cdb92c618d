//! Rule definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::expr::Condition;

/// Which symbols a rule applies to. `"*"` matches every symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SymbolFilter {
    #[default]
    Wildcard,
    Exact(String),
}

impl SymbolFilter {
    pub fn matches(&self, symbol: &str) -> bool {
        match self {
            SymbolFilter::Wildcard => true,
            SymbolFilter::Exact(s) => s == symbol,
        }
    }
}

impl From<String> for SymbolFilter {
    fn from(s: String) -> Self {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed == "*" {
            SymbolFilter::Wildcard
        } else {
            SymbolFilter::Exact(trimmed.to_uppercase())
        }
    }
}

impl From<&str> for SymbolFilter {
    fn from(s: &str) -> Self {
        SymbolFilter::from(s.to_string())
    }
}

impl From<SymbolFilter> for String {
    fn from(filter: SymbolFilter) -> Self {
        filter.to_string()
    }
}

impl fmt::Display for SymbolFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolFilter::Wildcard => write!(f, "*"),
            SymbolFilter::Exact(s) => write!(f, "{}", s),
        }
    }
}

fn default_cooldown_secs() -> u64 {
    300
}

/// A registered rule. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    /// Unique rule id
    pub id: String,
    #[serde(default)]
    pub symbol: SymbolFilter,
    pub condition: Condition,
    /// Minimum time between two admitted signals per symbol
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default)]
    pub description: String,
    /// Message template; the dispatcher default is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl RuleDefinition {
    pub fn new(id: impl Into<String>, symbol: impl Into<SymbolFilter>, condition: Condition) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into(),
            condition,
            cooldown_secs: default_cooldown_secs(),
            description: String::new(),
            template: None,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown_secs = cooldown.as_secs();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Description, falling back to the rendered condition.
    pub fn describe(&self) -> String {
        if self.description.is_empty() {
            self.condition.to_string()
        } else {
            self.description.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{CompareOp, Value};

    #[test]
    fn test_symbol_filter() {
        assert!(SymbolFilter::from("*").matches("AAPL"));
        assert!(SymbolFilter::from("aapl").matches("AAPL"));
        assert!(!SymbolFilter::from("MSFT").matches("AAPL"));
    }

    #[test]
    fn test_definition_from_toml() {
        let rule: RuleDefinition = toml::from_str(
            r#"
            id = "xyz_above_11"
            symbol = "XYZ"
            cooldown_secs = 60
            [condition]
            op = "compare"
            left = { type = "bar", field = "close" }
            cmp = "gt"
            right = { type = "const", value = 11 }
            "#,
        )
        .unwrap();

        assert_eq!(rule.symbol, SymbolFilter::Exact("XYZ".into()));
        assert_eq!(rule.cooldown(), Duration::from_secs(60));
        assert_eq!(
            rule.condition,
            Condition::compare(Value::close(), CompareOp::Gt, Value::constant(11.0))
        );
        assert_eq!(rule.describe(), "close > 11");
    }

    #[test]
    fn test_defaults() {
        let rule: RuleDefinition = toml::from_str(
            r#"
            id = "any_price"
            condition = { op = "compare", left = { type = "price" }, cmp = ">", right = { type = "const", value = 0.0 } }
            "#,
        )
        .unwrap();
        assert_eq!(rule.symbol, SymbolFilter::Wildcard);
        assert_eq!(rule.cooldown_secs, 300);
        assert!(rule.template.is_none());
    }
}
