//! Error types for feed operations.

use pricestep_engine::PriceError;
use thiserror::Error;

/// Errors that can occur while fetching prices.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Exchange API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::Timeout(err.to_string())
        } else if err.is_decode() {
            FeedError::ParseError(err.to_string())
        } else {
            FeedError::ConnectionFailed(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::ParseError(err.to_string())
    }
}

impl FeedError {
    /// Returns true if this error is transient and likely to succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FeedError::ConnectionFailed(_) | FeedError::Timeout(_) | FeedError::RateLimitExceeded
        )
    }

    /// Attach the symbol being priced.
    pub fn into_price_error(self, symbol: &str) -> PriceError {
        PriceError::unavailable(symbol, self.to_string())
    }
}
