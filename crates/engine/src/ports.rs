//! Collaborator seams the scheduler is built against.

use crate::{DeliveryError, PriceError, PriceMove, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pricestep_core::{Alert, AlertId, FixedPoint, NewAlert, Step};
use std::collections::BTreeSet;

/// Source of current exchange prices.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Current price of a symbol.
    async fn get_price(&self, symbol: &str) -> Result<FixedPoint, PriceError>;

    /// All tradable symbols.
    async fn list_symbols(&self) -> Result<BTreeSet<String>, PriceError>;
}

/// Persistent alert storage.
///
/// `update_baseline` is the only write path for `baseline_price` and
/// `baseline_time` after creation, apart from an explicit step update.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Active alerts ordered by id.
    async fn list_active(&self) -> Result<Vec<Alert>, StoreError>;

    /// Record the price and time an alert last fired.
    ///
    /// The write only lands if the stored row is still active and still
    /// carries the step and baseline of `loaded`. A row edited since it was
    /// loaded yields [`StoreError::Stale`], a deleted one
    /// [`StoreError::NotFound`].
    async fn update_baseline(
        &self,
        loaded: &Alert,
        price: FixedPoint,
        time: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Enable or disable an alert. The baseline is retained either way.
    async fn toggle(&self, id: AlertId, active: bool) -> Result<(), StoreError>;

    /// Insert a new alert.
    async fn create(&self, alert: NewAlert) -> Result<Alert, StoreError>;

    async fn get(&self, id: AlertId) -> Result<Option<Alert>, StoreError>;

    /// All alerts (active or not) for one owner, ordered by id.
    async fn list_for_owner(&self, owner: &str) -> Result<Vec<Alert>, StoreError>;

    /// Alert with the same owner, symbol and step, if any.
    async fn find_existing(
        &self,
        owner: &str,
        symbol: &str,
        step: Step,
    ) -> Result<Option<Alert>, StoreError>;

    /// Change the step and reset the baseline, as on creation.
    async fn update_step(
        &self,
        id: AlertId,
        step: Step,
        baseline: Option<FixedPoint>,
        time: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn remove(&self, id: AlertId) -> Result<(), StoreError>;
}

/// Delivers price moves to alert owners.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, price_move: &PriceMove) -> Result<(), DeliveryError>;
}
