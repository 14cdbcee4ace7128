//! Alert subscription types.

use crate::{AlertError, FixedPoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable alert identifier assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AlertId(pub i64);

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AlertId {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .trim_start_matches('#')
            .parse::<i64>()
            .map(AlertId)
            .map_err(|_| AlertError::InvalidAlertId(s.to_string()))
    }
}

/// Minimum absolute price movement that re-fires an alert.
/// Always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Step(FixedPoint);

impl Step {
    pub fn new(value: FixedPoint) -> Result<Self, AlertError> {
        if value.is_zero() {
            return Err(AlertError::NonPositiveStep(value.to_string()));
        }
        if value > FixedPoint::MAX {
            return Err(AlertError::InvalidNumber(value.to_string()));
        }
        Ok(Self(value))
    }

    #[inline]
    pub fn value(self) -> FixedPoint {
        self.0
    }
}

/// Accepts `"1000"`, `"0.01"`, `"$0.5"`. Negative, zero and malformed
/// input is rejected.
impl FromStr for Step {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('$');
        if trimmed.starts_with('-') {
            return Err(AlertError::NonPositiveStep(s.trim().to_string()));
        }
        Step::new(trimmed.parse()?)
    }
}

impl<'de> Deserialize<'de> for Step {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = FixedPoint::deserialize(deserializer)?;
        Step::new(value).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Normalize user input into a ticker symbol (`" btc "` -> `"BTC"`).
pub fn normalize_symbol(input: &str) -> String {
    input.trim().to_uppercase()
}

/// A price alert subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    /// Opaque recipient identifier (Telegram chat id).
    pub owner: String,
    pub symbol: String,
    pub step: Step,
    /// Price at which the alert last fired or was created.
    pub baseline_price: Option<FixedPoint>,
    /// Display only; never used for firing decisions.
    pub baseline_time: Option<DateTime<Utc>>,
    pub active: bool,
}

/// Fields needed to create an alert. The id is assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub owner: String,
    pub symbol: String,
    pub step: Step,
    /// Snapshot of the current price at creation time.
    pub baseline_price: Option<FixedPoint>,
    pub baseline_time: DateTime<Utc>,
}

impl NewAlert {
    pub fn new(
        owner: impl Into<String>,
        symbol: &str,
        step: Step,
        baseline_price: Option<FixedPoint>,
    ) -> Self {
        Self {
            owner: owner.into(),
            symbol: normalize_symbol(symbol),
            step,
            baseline_price,
            baseline_time: Utc::now(),
        }
    }
}
