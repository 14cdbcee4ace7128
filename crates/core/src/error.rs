//! Error types for core alert data.

use thiserror::Error;

/// Errors raised while building alert values from user or wire input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AlertError {
    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error("Step must be greater than zero, got {0}")]
    NonPositiveStep(String),

    #[error("Invalid symbol: {0:?}. Use 2-10 letters or digits, e.g. BTC")]
    InvalidSymbol(String),

    #[error("Invalid alert id: {0}")]
    InvalidAlertId(String),

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),
}
