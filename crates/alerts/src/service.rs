//! User-facing alert management on top of the store and price source.

use crate::flow::is_valid_symbol;
use chrono::Utc;
use pricestep_core::{normalize_symbol, Alert, AlertError, AlertId, NewAlert, Step};
use pricestep_engine::{AlertStore, PriceError, PriceSource, StoreError};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error(transparent)]
    Invalid(#[from] AlertError),
    #[error("Unknown or untradable symbol: {0}")]
    UnknownSymbol(String),
    #[error("Alert #{0} not found")]
    NotFound(AlertId),
    #[error(transparent)]
    Price(#[from] PriceError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => ServiceError::NotFound(id),
            other => ServiceError::Store(other),
        }
    }
}

/// Result of [`AlertService::add_alert`].
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    Created(Alert),
    /// Same owner, symbol and step already existed and was active.
    Existing(Alert),
    /// Same owner, symbol and step existed but was paused; it is active again
    /// with its baseline untouched.
    Reactivated(Alert),
}

impl AddOutcome {
    pub fn alert(&self) -> &Alert {
        match self {
            AddOutcome::Created(a) | AddOutcome::Existing(a) | AddOutcome::Reactivated(a) => a,
        }
    }
}

/// Alert management service.
///
/// Every operation taking an id also takes the caller's owner id; alerts of
/// other owners are reported as not found.
#[derive(Clone)]
pub struct AlertService {
    store: Arc<dyn AlertStore>,
    prices: Arc<dyn PriceSource>,
}

impl AlertService {
    pub fn new(store: Arc<dyn AlertStore>, prices: Arc<dyn PriceSource>) -> Self {
        Self { store, prices }
    }

    /// Check the shape of `symbol`, then validate it by pricing it; the price
    /// becomes the baseline of a newly created alert.
    pub async fn add_alert(
        &self,
        owner: &str,
        symbol: &str,
        step: Step,
    ) -> Result<AddOutcome, ServiceError> {
        let symbol = normalize_symbol(symbol);
        if !is_valid_symbol(&symbol) {
            return Err(AlertError::InvalidSymbol(symbol).into());
        }

        let price = self
            .prices
            .get_price(&symbol)
            .await
            .map_err(|_| ServiceError::UnknownSymbol(symbol.clone()))?;

        if let Some(mut existing) = self.store.find_existing(owner, &symbol, step).await? {
            if existing.active {
                return Ok(AddOutcome::Existing(existing));
            }
            self.store.toggle(existing.id, true).await?;
            existing.active = true;
            info!(alert_id = %existing.id, owner = owner, symbol = %symbol, "Alert reactivated");
            return Ok(AddOutcome::Reactivated(existing));
        }

        let alert = self
            .store
            .create(NewAlert::new(owner, &symbol, step, Some(price)))
            .await?;
        info!(
            alert_id = %alert.id,
            owner = owner,
            symbol = %alert.symbol,
            step = %alert.step,
            baseline = %price,
            "Alert created"
        );
        Ok(AddOutcome::Created(alert))
    }

    /// Change the step and restart tracking from the current price.
    pub async fn update_step(
        &self,
        owner: &str,
        id: AlertId,
        step: Step,
    ) -> Result<Alert, ServiceError> {
        let mut alert = self.owned(owner, id).await?;
        let price = self.prices.get_price(&alert.symbol).await?;
        let now = Utc::now();

        self.store.update_step(id, step, Some(price), now).await?;
        alert.step = step;
        alert.baseline_price = Some(price);
        alert.baseline_time = Some(now);
        info!(alert_id = %id, step = %step, baseline = %price, "Alert step updated");
        Ok(alert)
    }

    /// Pause or resume an alert. The baseline is kept.
    pub async fn set_active(
        &self,
        owner: &str,
        id: AlertId,
        active: bool,
    ) -> Result<Alert, ServiceError> {
        let mut alert = self.owned(owner, id).await?;
        self.store.toggle(id, active).await?;
        alert.active = active;
        info!(alert_id = %id, active = active, "Alert toggled");
        Ok(alert)
    }

    pub async fn remove(&self, owner: &str, id: AlertId) -> Result<Alert, ServiceError> {
        let alert = self.owned(owner, id).await?;
        self.store.remove(id).await?;
        info!(alert_id = %id, owner = owner, "Alert removed");
        Ok(alert)
    }

    pub async fn alerts_for(&self, owner: &str) -> Result<Vec<Alert>, ServiceError> {
        Ok(self.store.list_for_owner(owner).await?)
    }

    pub async fn available_symbols(&self) -> Result<BTreeSet<String>, ServiceError> {
        Ok(self.prices.list_symbols().await?)
    }

    async fn owned(&self, owner: &str, id: AlertId) -> Result<Alert, ServiceError> {
        match self.store.get(id).await? {
            Some(alert) if alert.owner == owner => Ok(alert),
            _ => Err(ServiceError::NotFound(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use pricestep_core::FixedPoint;
    use pricestep_engine::mock::{MemoryStore, MockPriceSource};

    fn price(s: &str) -> FixedPoint {
        s.parse().unwrap()
    }

    fn step(s: &str) -> Step {
        s.parse().unwrap()
    }

    fn setup() -> (AlertService, Arc<MemoryStore>, Arc<MockPriceSource>) {
        let store = Arc::new(MemoryStore::new());
        let prices = Arc::new(MockPriceSource::new());
        prices.set_price("BTC", price("30000"));
        prices.set_price("ETH", price("2500"));
        let service = AlertService::new(store.clone(), prices.clone());
        (service, store, prices)
    }

    #[tokio::test]
    async fn test_add_alert_snapshots_baseline() {
        let (service, store, _) = setup();
        let outcome = service.add_alert("1", " btc ", step("1000")).await.unwrap();

        let alert = match outcome {
            AddOutcome::Created(alert) => alert,
            other => panic!("expected Created, got {:?}", other),
        };
        assert_eq!(alert.symbol, "BTC");
        assert_eq!(alert.baseline_price, Some(price("30000")));
        assert!(alert.active);
        assert_eq!(store.snapshot(alert.id), Some(alert));
    }

    #[tokio::test]
    async fn test_add_alert_unknown_symbol() {
        let (service, store, _) = setup();
        let err = service.add_alert("1", "nope", step("1")).await.unwrap_err();
        assert_eq!(err, ServiceError::UnknownSymbol("NOPE".to_string()));
        assert!(store.list_for_owner("1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_alert_rejects_malformed_symbol_before_pricing() {
        let (service, store, prices) = setup();
        for raw in ["BTC/USDT", "x", "", "ABCDEFGHIJK"] {
            let err = service.add_alert("1", raw, step("1")).await.unwrap_err();
            assert_eq!(
                err,
                ServiceError::Invalid(AlertError::InvalidSymbol(normalize_symbol(raw)))
            );
        }
        assert_eq!(prices.total_calls(), 0);
        assert!(store.list_for_owner("1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_alert_reuses_existing() {
        let (service, _, _) = setup();
        let first = service.add_alert("1", "BTC", step("1000")).await.unwrap();
        let second = service.add_alert("1", "btc", step("1000")).await.unwrap();

        assert!(matches!(second, AddOutcome::Existing(_)));
        assert_eq!(first.alert().id, second.alert().id);
        assert_eq!(service.alerts_for("1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_alert_reactivates_paused_keeping_baseline() {
        let (service, store, prices) = setup();
        let created = service.add_alert("1", "BTC", step("1000")).await.unwrap();
        let id = created.alert().id;
        service.set_active("1", id, false).await.unwrap();

        prices.set_price("BTC", price("35000"));
        let outcome = service.add_alert("1", "BTC", step("1000")).await.unwrap();

        assert!(matches!(outcome, AddOutcome::Reactivated(_)));
        let stored = store.snapshot(id).unwrap();
        assert!(stored.active);
        assert_eq!(stored.baseline_price, Some(price("30000")));
    }

    #[tokio::test]
    async fn test_different_step_creates_new_alert() {
        let (service, _, _) = setup();
        service.add_alert("1", "BTC", step("1000")).await.unwrap();
        let outcome = service.add_alert("1", "BTC", step("500")).await.unwrap();
        assert!(matches!(outcome, AddOutcome::Created(_)));
        assert_eq!(service.alerts_for("1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_step_resets_baseline() {
        let (service, store, prices) = setup();
        let id = service
            .add_alert("1", "ETH", step("100"))
            .await
            .unwrap()
            .alert()
            .id;

        prices.set_price("ETH", price("2650"));
        let updated = service.update_step("1", id, step("10")).await.unwrap();

        assert_eq!(updated.step, step("10"));
        assert_eq!(updated.baseline_price, Some(price("2650")));
        assert_eq!(store.snapshot(id).unwrap().baseline_price, Some(price("2650")));
    }

    #[tokio::test]
    async fn test_update_step_price_failure_leaves_alert_untouched() {
        let (service, store, prices) = setup();
        let id = service
            .add_alert("1", "ETH", step("100"))
            .await
            .unwrap()
            .alert()
            .id;

        prices.fail_symbol("ETH");
        let err = service.update_step("1", id, step("10")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Price(_)));
        assert_eq!(store.snapshot(id).unwrap().step, step("100"));
    }

    #[tokio::test]
    async fn test_other_owner_cannot_touch_alert() {
        let (service, store, _) = setup();
        let id = service
            .add_alert("1", "BTC", step("1000"))
            .await
            .unwrap()
            .alert()
            .id;

        assert_eq!(
            service.set_active("2", id, false).await,
            Err(ServiceError::NotFound(id))
        );
        assert_eq!(service.remove("2", id).await, Err(ServiceError::NotFound(id)));
        assert_eq!(
            service.update_step("2", id, step("1")).await,
            Err(ServiceError::NotFound(id))
        );
        assert!(store.snapshot(id).unwrap().active);
    }

    #[tokio::test]
    async fn test_remove() {
        let (service, store, _) = setup();
        let id = service
            .add_alert("1", "BTC", step("1000"))
            .await
            .unwrap()
            .alert()
            .id;

        service.remove("1", id).await.unwrap();
        assert_eq!(store.snapshot(id), None);
        assert_eq!(service.remove("1", id).await, Err(ServiceError::NotFound(id)));
    }

    #[tokio::test]
    async fn test_available_symbols() {
        let (service, _, _) = setup();
        let symbols = service.available_symbols().await.unwrap();
        assert_eq!(
            symbols.into_iter().collect::<Vec<_>>(),
            vec!["BTC".to_string(), "ETH".to_string()]
        );
    }
}
