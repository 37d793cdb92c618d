//! Core traits for the alerting core.

mod feed;
mod indicator;
mod notifier;

pub use feed::FeedControl;
pub use indicator::StreamingIndicator;
pub use notifier::Notifier;
