//! Alert delivery records.

use serde::{Deserialize, Serialize};

use super::Signal;
use crate::error::DeliveryError;

/// Final result of dispatching one signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered {
        attempts: u32,
    },
    /// Not retried further. `exhausted` is true when the attempt ceiling was
    /// hit on transient failures rather than a permanent rejection.
    PermanentFailure {
        attempts: u32,
        reason: String,
        exhausted: bool,
    },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            DeliveryOutcome::Delivered { attempts } => *attempts,
            DeliveryOutcome::PermanentFailure { attempts, .. } => *attempts,
        }
    }

    /// Surface a failure as a `DeliveryError::Permanent`.
    pub fn into_result(self) -> Result<u32, DeliveryError> {
        match self {
            DeliveryOutcome::Delivered { attempts } => Ok(attempts),
            DeliveryOutcome::PermanentFailure {
                attempts,
                reason,
                exhausted,
            } => Err(DeliveryError::Permanent {
                attempts,
                reason,
                exhausted,
            }),
        }
    }
}

/// A signal together with its rendered message and delivery history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub signal: Signal,
    pub message: String,
    pub destination: String,
    pub attempts: u32,
    pub outcome: Option<DeliveryOutcome>,
}

impl AlertRecord {
    pub fn new(signal: Signal, message: String, destination: String) -> Self {
        Self {
            signal,
            message,
            destination,
            attempts: 0,
            outcome: None,
        }
    }

    pub fn finish(&mut self, outcome: DeliveryOutcome) {
        self.attempts = outcome.attempts();
        self.outcome = Some(outcome);
    }
}
