//! Notification payload for a fired alert.

use chrono::{DateTime, TimeDelta, Utc};
use pricestep_core::{Alert, AlertId, FixedPoint, Step};
use serde::{Deserialize, Serialize};

/// A fired alert's price move, as handed to the notifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceMove {
    pub alert_id: AlertId,
    pub owner: String,
    pub symbol: String,
    pub step: Step,
    /// Newly observed price (the new baseline).
    pub price: FixedPoint,
    /// Baseline before this fire. `None` on a first-observation fire.
    pub previous_price: Option<FixedPoint>,
    pub previous_time: Option<DateTime<Utc>>,
    pub observed_at: DateTime<Utc>,
}

impl PriceMove {
    /// Build from the alert as it was loaded, before the baseline advanced.
    pub fn new(alert: &Alert, price: FixedPoint, observed_at: DateTime<Utc>) -> Self {
        Self {
            alert_id: alert.id,
            owner: alert.owner.clone(),
            symbol: alert.symbol.clone(),
            step: alert.step,
            price,
            previous_price: alert.baseline_price,
            previous_time: alert.baseline_time,
            observed_at,
        }
    }

    /// Signed move in raw fixed-point units.
    pub fn delta_raw(&self) -> Option<i128> {
        self.previous_price.map(|prev| self.price.signed_diff(prev))
    }

    /// Signed move as f64 (display only).
    pub fn delta(&self) -> Option<f64> {
        self.delta_raw()
            .map(|raw| raw as f64 / FixedPoint::SCALE as f64)
    }

    pub fn abs_delta(&self) -> Option<FixedPoint> {
        self.previous_price.map(|prev| self.price.abs_diff(prev))
    }

    /// Sign-aware percent change relative to the previous baseline.
    pub fn percent_change(&self) -> Option<f64> {
        let prev = self.previous_price?;
        if prev.is_zero() {
            return None;
        }
        let raw = self.delta_raw()?;
        Some(raw as f64 * 100.0 / prev.0 as f64)
    }

    pub fn is_up(&self) -> bool {
        self.delta_raw().map_or(true, |raw| raw >= 0)
    }

    /// Time since the previous baseline was recorded.
    pub fn elapsed(&self) -> Option<TimeDelta> {
        self.previous_time.map(|prev| self.observed_at - prev)
    }
}
