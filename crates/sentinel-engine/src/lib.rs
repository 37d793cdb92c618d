//! Alert pipeline.
//!
//! feed -> normalizer -> per-symbol shard (store, rules, dedup) -> alert
//! queue -> dispatcher. Connection events go to the reconnect supervisor.

mod pipeline;
mod shard;

pub use pipeline::{Pipeline, PipelineConfig};
pub use shard::shard_for;
