//! Error types raised by the scheduler's collaborators.

use pricestep_core::AlertId;
use thiserror::Error;

/// Price lookup failure. Scoped to one symbol for one tick.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PriceError {
    #[error("Price unavailable for {symbol}: {reason}")]
    Unavailable { symbol: String, reason: String },

    #[error("Symbol list unavailable: {0}")]
    ListUnavailable(String),
}

impl PriceError {
    pub fn unavailable(symbol: &str, reason: impl Into<String>) -> Self {
        PriceError::Unavailable {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }
}

/// Alert store failure.
///
/// `Backend` aborts the remaining writes of a tick. `NotFound` and `Stale`
/// only skip the alert they name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Alert not found: {0}")]
    NotFound(AlertId),

    #[error("Alert {0} was changed since it was loaded")]
    Stale(AlertId),
}

impl StoreError {
    /// True when the error concerns one alert rather than the store itself.
    pub fn is_alert_scoped(&self) -> bool {
        matches!(self, StoreError::NotFound(_) | StoreError::Stale(_))
    }
}

/// Notification delivery failure for a single recipient.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Delivery to {owner} failed: {reason}")]
    Failed { owner: String, reason: String },
}
