//! In-memory collaborators for tests and dry runs.

use crate::{AlertStore, DeliveryError, Notifier, PriceError, PriceMove, PriceSource, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pricestep_core::{Alert, AlertId, FixedPoint, NewAlert, Step};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

/// Price source backed by a settable price table.
#[derive(Debug, Default)]
pub struct MockPriceSource {
    prices: Mutex<HashMap<String, FixedPoint>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl MockPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, symbol: &str, price: FixedPoint) {
        if let Ok(mut prices) = self.prices.lock() {
            prices.insert(symbol.to_string(), price);
        }
    }

    /// Make every lookup of `symbol` fail.
    pub fn fail_symbol(&self, symbol: &str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(symbol.to_string());
        }
    }

    /// Number of `get_price` calls made for a symbol.
    pub fn calls_for(&self, symbol: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.iter().filter(|s| s.as_str() == symbol).count())
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }
}

#[async_trait]
impl PriceSource for MockPriceSource {
    async fn get_price(&self, symbol: &str) -> Result<FixedPoint, PriceError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(symbol.to_string());
        }
        let failing = self
            .failing
            .lock()
            .map(|f| f.contains(symbol))
            .unwrap_or(false);
        if failing {
            return Err(PriceError::unavailable(symbol, "mock failure"));
        }
        self.prices
            .lock()
            .ok()
            .and_then(|prices| prices.get(symbol).copied())
            .ok_or_else(|| PriceError::unavailable(symbol, "unknown symbol"))
    }

    async fn list_symbols(&self) -> Result<BTreeSet<String>, PriceError> {
        self.prices
            .lock()
            .map(|prices| prices.keys().cloned().collect())
            .map_err(|e| PriceError::ListUnavailable(e.to_string()))
    }
}

/// A user edit applied right after the next `list_active` returns,
/// standing in for a command that lands in the middle of a tick.
#[derive(Debug, Clone)]
pub enum PendingEdit {
    Remove(AlertId),
    Pause(AlertId),
    Step {
        id: AlertId,
        step: Step,
        baseline: Option<FixedPoint>,
    },
}

/// Alert store kept in a `BTreeMap`, with failure injection.
#[derive(Debug)]
pub struct MemoryStore {
    alerts: Mutex<BTreeMap<AlertId, Alert>>,
    next_id: AtomicI64,
    fail_list: Mutex<bool>,
    fail_baseline_for: Mutex<HashSet<AlertId>>,
    baseline_writes: Mutex<Vec<AlertId>>,
    pending_edits: Mutex<Vec<PendingEdit>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            alerts: Mutex::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
            fail_list: Mutex::new(false),
            fail_baseline_for: Mutex::new(HashSet::new()),
            baseline_writes: Mutex::new(Vec::new()),
            pending_edits: Mutex::new(Vec::new()),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_list(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_list.lock() {
            *flag = fail;
        }
    }

    /// Make `update_baseline` fail for one alert.
    pub fn fail_baseline_update(&self, id: AlertId) {
        if let Ok(mut ids) = self.fail_baseline_for.lock() {
            ids.insert(id);
        }
    }

    /// Ids passed to successful `update_baseline` calls, in order.
    pub fn baseline_writes(&self) -> Vec<AlertId> {
        self.baseline_writes
            .lock()
            .map(|w| w.clone())
            .unwrap_or_default()
    }

    /// Queue an edit to run once the next `list_active` snapshot is taken.
    pub fn edit_after_list(&self, edit: PendingEdit) {
        if let Ok(mut edits) = self.pending_edits.lock() {
            edits.push(edit);
        }
    }

    fn apply_pending_edits(&self) -> Result<(), StoreError> {
        let edits: Vec<PendingEdit> = self
            .pending_edits
            .lock()
            .map(|mut e| e.drain(..).collect())
            .unwrap_or_default();
        let mut alerts = self
            .alerts
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        for edit in edits {
            match edit {
                PendingEdit::Remove(id) => {
                    alerts.remove(&id);
                }
                PendingEdit::Pause(id) => {
                    if let Some(alert) = alerts.get_mut(&id) {
                        alert.active = false;
                    }
                }
                PendingEdit::Step { id, step, baseline } => {
                    if let Some(alert) = alerts.get_mut(&id) {
                        alert.step = step;
                        alert.baseline_price = baseline;
                        alert.baseline_time = Some(Utc::now());
                    }
                }
            }
        }
        Ok(())
    }

    pub fn snapshot(&self, id: AlertId) -> Option<Alert> {
        self.alerts.lock().ok().and_then(|a| a.get(&id).cloned())
    }

    fn with_alert<T>(
        &self,
        id: AlertId,
        f: impl FnOnce(&mut Alert) -> T,
    ) -> Result<T, StoreError> {
        let mut alerts = self
            .alerts
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        alerts.get_mut(&id).map(f).ok_or(StoreError::NotFound(id))
    }

    fn filtered(&self, keep: impl Fn(&Alert) -> bool) -> Result<Vec<Alert>, StoreError> {
        let alerts = self
            .alerts
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(alerts.values().filter(|a| keep(a)).cloned().collect())
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn list_active(&self) -> Result<Vec<Alert>, StoreError> {
        if self.fail_list.lock().map(|f| *f).unwrap_or(false) {
            return Err(StoreError::Backend("mock list failure".to_string()));
        }
        let active = self.filtered(|a| a.active)?;
        self.apply_pending_edits()?;
        Ok(active)
    }

    async fn update_baseline(
        &self,
        loaded: &Alert,
        price: FixedPoint,
        time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let id = loaded.id;
        let failing = self
            .fail_baseline_for
            .lock()
            .map(|ids| ids.contains(&id))
            .unwrap_or(false);
        if failing {
            return Err(StoreError::Backend(format!("mock write failure for {}", id)));
        }
        let written = self.with_alert(id, |alert| {
            let unchanged = alert.active
                && alert.step == loaded.step
                && alert.baseline_price == loaded.baseline_price;
            if unchanged {
                alert.baseline_price = Some(price);
                alert.baseline_time = Some(time);
            }
            unchanged
        })?;
        if !written {
            return Err(StoreError::Stale(id));
        }
        if let Ok(mut writes) = self.baseline_writes.lock() {
            writes.push(id);
        }
        Ok(())
    }

    async fn toggle(&self, id: AlertId, active: bool) -> Result<(), StoreError> {
        self.with_alert(id, |alert| alert.active = active)
    }

    async fn create(&self, new: NewAlert) -> Result<Alert, StoreError> {
        let id = AlertId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let alert = Alert {
            id,
            owner: new.owner,
            symbol: new.symbol,
            step: new.step,
            baseline_price: new.baseline_price,
            baseline_time: Some(new.baseline_time),
            active: true,
        };
        self.alerts
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .insert(id, alert.clone());
        Ok(alert)
    }

    async fn get(&self, id: AlertId) -> Result<Option<Alert>, StoreError> {
        Ok(self.snapshot(id))
    }

    async fn list_for_owner(&self, owner: &str) -> Result<Vec<Alert>, StoreError> {
        self.filtered(|a| a.owner == owner)
    }

    async fn find_existing(
        &self,
        owner: &str,
        symbol: &str,
        step: Step,
    ) -> Result<Option<Alert>, StoreError> {
        Ok(self
            .filtered(|a| a.owner == owner && a.symbol == symbol && a.step == step)?
            .into_iter()
            .next())
    }

    async fn update_step(
        &self,
        id: AlertId,
        step: Step,
        baseline: Option<FixedPoint>,
        time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_alert(id, |alert| {
            alert.step = step;
            alert.baseline_price = baseline;
            alert.baseline_time = Some(time);
        })
    }

    async fn remove(&self, id: AlertId) -> Result<(), StoreError> {
        self.alerts
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }
}

/// Notifier that records deliveries and can fail per owner.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<PriceMove>>,
    failing_owners: Mutex<HashSet<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_owner(&self, owner: &str) {
        if let Ok(mut owners) = self.failing_owners.lock() {
            owners.insert(owner.to_string());
        }
    }

    pub fn sent(&self) -> Vec<PriceMove> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, price_move: &PriceMove) -> Result<(), DeliveryError> {
        let failing = self
            .failing_owners
            .lock()
            .map(|o| o.contains(&price_move.owner))
            .unwrap_or(false);
        if failing {
            return Err(DeliveryError::Failed {
                owner: price_move.owner.clone(),
                reason: "mock delivery failure".to_string(),
            });
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(price_move.clone());
        }
        Ok(())
    }
}
