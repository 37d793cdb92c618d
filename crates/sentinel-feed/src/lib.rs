//! Market feed handling.
//!
//! This crate provides:
//! - The raw wire messages and the [`Normalizer`] that turns them into
//!   sequenced [`MarketEvent`](sentinel_core::types::MarketEvent)s
//! - The reconnect [`ConnectionStateMachine`] and its async [`ReconnectSupervisor`]
//! - Replay sources (JSON lines, CSV bars) and a [`ReplayFeed`] for offline runs

pub mod normalizer;
pub mod raw;
pub mod replay;
pub mod state_machine;
pub mod supervisor;

pub use normalizer::{Normalized, Normalizer, NormalizerCounts};
pub use raw::{LinkState, RawMessage};
pub use replay::{load_csv_bars, load_json_lines, parse_timestamp, read_csv_bars, ReplayFeed};
pub use state_machine::{ConnectionState, ConnectionStateMachine, SupervisorAction, SupervisorInput};
pub use supervisor::{ReconnectSupervisor, SupervisorHandle, SupervisorStats};
