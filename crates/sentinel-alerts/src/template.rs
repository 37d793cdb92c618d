//! Message templates.
//!
//! `{name}` placeholders are replaced with signal fields (`rule_id`,
//! `symbol`, `description`, `time`, `sequence`, `signal_id`) or snapshot
//! values by name (`price`, `close`, `ma20`, ...). Unknown placeholders are
//! left as written.

use std::collections::HashMap;

use sentinel_core::types::Signal;

/// Default alert message (Telegram HTML).
pub const DEFAULT_TEMPLATE: &str = "🚨 <b>{rule_id}</b> - {symbol}\n\
💰 Price: <b>${price}</b>\n\
⏰ Time: {time}\n\
\n\
💬 <i>{description}</i>";

fn lookup(signal: &Signal, name: &str) -> Option<String> {
    match name {
        "rule_id" => Some(signal.rule_id.clone()),
        "symbol" => Some(signal.symbol.clone()),
        "description" => Some(signal.description.clone()),
        "time" => Some(
            signal
                .fired_datetime()
                .format("%Y-%m-%d %H:%M:%S UTC")
                .to_string(),
        ),
        "sequence" => Some(signal.sequence.to_string()),
        "signal_id" => Some(signal.id.to_string()),
        _ => signal.value(name).map(|v| format!("{:.2}", v)),
    }
}

/// Render a template for a signal.
pub fn render(template: &str, signal: &Signal) -> String {
    let mut out = String::with_capacity(template.len() + 32);
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };

        let name = &after[..end];
        let is_ident = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        match is_ident.then(|| lookup(signal, name)).flatten() {
            Some(value) => out.push_str(&value),
            None => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

/// Default template plus per-rule overrides.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    default: String,
    per_rule: HashMap<String, String>,
}

impl TemplateSet {
    pub fn new(default: impl Into<String>, per_rule: HashMap<String, String>) -> Self {
        Self {
            default: default.into(),
            per_rule,
        }
    }

    pub fn template_for(&self, rule_id: &str) -> &str {
        self.per_rule
            .get(rule_id)
            .map(String::as_str)
            .unwrap_or(&self.default)
    }

    pub fn render(&self, signal: &Signal) -> String {
        render(self.template_for(&signal.rule_id), signal)
    }
}

impl Default for TemplateSet {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE, HashMap::new())
    }
}
