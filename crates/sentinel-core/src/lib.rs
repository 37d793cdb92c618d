//! Core types and traits for the alerting core.
//!
//! This crate provides the foundational building blocks including:
//! - Market data types (Bar, BarWindow, Tick, MarketEvent)
//! - Signals and alert records
//! - The error taxonomy shared by every pipeline stage
//! - Collaborator traits for the feed and the notification transport
//! - Exponential backoff used by reconnects and delivery retries

pub mod backoff;
pub mod error;
pub mod traits;
pub mod types;

pub use backoff::Backoff;
pub use error::{SentinelError, SentinelResult};
pub use traits::*;
pub use types::*;
