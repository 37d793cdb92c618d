//! Instrument state store.
//!
//! Keeps one [`InstrumentState`] per symbol, updated incrementally as market
//! events arrive. Events for a symbol are applied strictly in sequence order;
//! anything at or below the last applied sequence is reported as stale and
//! leaves the state untouched.

pub mod state;
pub mod store;

pub use state::{Frame, InstrumentState, StateInput};
pub use store::{ApplyOutcome, InstrumentStateStore, StateDelta};
