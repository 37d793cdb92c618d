//! Alerting: from fired signal to delivered message.
//!
//! - [`Deduplicator`]: per (rule, symbol) cooldown, checked and updated atomically
//! - [`AlertQueue`]: bounded hand-off to the dispatcher, dropping the oldest entry when full
//! - [`TemplateSet`]: `{placeholder}` message rendering
//! - [`Dispatcher`]: delivery with bounded exponential retry on transient failures
//! - [`notifier`]: log, webhook and Telegram transports

pub mod cooldown;
pub mod dispatcher;
pub mod notifier;
pub mod queue;
pub mod template;

pub use cooldown::{Admission, CooldownEntry, CooldownSnapshot, Deduplicator};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use notifier::{LogNotifier, TelegramNotifier, WebhookNotifier};
pub use queue::{AlertQueue, PushOutcome};
pub use template::{render, TemplateSet, DEFAULT_TEMPLATE};
