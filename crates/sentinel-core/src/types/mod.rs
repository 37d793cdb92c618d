//! Core data types for the alerting core.

mod alert;
mod bar;
mod event;
mod signal;

pub use alert::{AlertRecord, DeliveryOutcome};
pub use bar::{Bar, BarField, BarWindow};
pub use event::{EventKind, EventPayload, MarketEvent, Tick};
pub use signal::Signal;
