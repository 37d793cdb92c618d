//! Logging setup and pipeline metrics.

mod logging;
mod metrics;

pub use logging::{setup_logging, LogFormat};
pub use metrics::{Counter, MetricsSnapshot, PipelineMetrics};
