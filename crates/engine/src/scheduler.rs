//! Alert polling scheduler.
//!
//! Each tick loads the active alerts, fetches one price per distinct symbol,
//! evaluates every alert against that snapshot, persists advanced baselines
//! and then dispatches notifications. Ticks never overlap.

use crate::{
    evaluate, AlertStore, Decision, FirstObservationPolicy, Notifier, Outcome, PriceMove,
    PriceSource,
};
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use pricestep_core::{Alert, FixedPoint};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between the start of consecutive ticks.
    pub poll_interval: Duration,
    /// Maximum concurrent price lookups within one tick.
    pub price_fetch_concurrency: usize,
    /// Maximum concurrent notification sends within one tick.
    pub notify_concurrency: usize,
    /// Behavior for alerts without a baseline.
    pub first_observation: FirstObservationPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            price_fetch_concurrency: 8,
            notify_concurrency: 4,
            first_observation: FirstObservationPolicy::Adopt,
        }
    }
}

/// Counters for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub active: usize,
    pub symbols: usize,
    pub priced: usize,
    pub fired: usize,
    pub initialized: usize,
    pub persisted: usize,
    /// Alerts removed or edited between load and write.
    pub skipped: usize,
    pub delivered: usize,
    pub delivery_failures: usize,
    pub store_failed: bool,
}

/// Periodic alert evaluator.
pub struct Scheduler {
    config: SchedulerConfig,
    prices: Arc<dyn PriceSource>,
    store: Arc<dyn AlertStore>,
    notifier: Arc<dyn Notifier>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        prices: Arc<dyn PriceSource>,
        store: Arc<dyn AlertStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            prices,
            store,
            notifier,
        }
    }

    /// Run ticks until `shutdown` turns true or its sender is dropped.
    /// The signal is only observed between ticks.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.poll_interval.as_secs(),
            first_observation = %self.config.first_observation,
            "Starting alert scheduler"
        );

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = interval.tick() => {}
            }

            let report = self.tick().await;
            if report.fired > 0 || report.store_failed {
                info!(
                    active = report.active,
                    symbols = report.symbols,
                    priced = report.priced,
                    fired = report.fired,
                    skipped = report.skipped,
                    delivered = report.delivered,
                    delivery_failures = report.delivery_failures,
                    store_failed = report.store_failed,
                    "Tick complete"
                );
            } else {
                debug!(
                    active = report.active,
                    symbols = report.symbols,
                    priced = report.priced,
                    initialized = report.initialized,
                    "Tick complete"
                );
            }
        }

        info!("Alert scheduler stopped");
    }

    /// Run one evaluation cycle. Errors are logged and counted, never returned.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        let alerts = match self.store.list_active().await {
            Ok(alerts) => alerts,
            Err(e) => {
                error!(error = %e, "Failed to load active alerts");
                report.store_failed = true;
                return report;
            }
        };
        report.active = alerts.len();
        if alerts.is_empty() {
            return report;
        }

        let symbols: BTreeSet<String> = alerts.iter().map(|a| a.symbol.clone()).collect();
        report.symbols = symbols.len();

        // Every alert on a symbol sees the same fetched price
        let prices = self.fetch_prices(symbols).await;
        report.priced = prices.len();

        let pending = self.evaluate_all(alerts, &prices, &mut report);
        let moves = self.persist(pending, &mut report).await;

        let (delivered, failed) = self.dispatch(moves).await;
        report.delivered = delivered;
        report.delivery_failures = failed;
        report
    }

    /// Fetch one price per symbol, bounded fan-out, joined before returning.
    async fn fetch_prices(&self, symbols: BTreeSet<String>) -> HashMap<String, FixedPoint> {
        let concurrency = self.config.price_fetch_concurrency.max(1);

        stream::iter(symbols.into_iter().map(|symbol| {
            let prices = Arc::clone(&self.prices);
            async move {
                match prices.get_price(&symbol).await {
                    Ok(price) => Some((symbol, price)),
                    Err(e) => {
                        warn!(symbol = %symbol, error = %e, "Skipping symbol this tick");
                        None
                    }
                }
            }
        }))
        .buffer_unordered(concurrency)
        .filter_map(|entry| async move { entry })
        .collect()
        .await
    }

    fn evaluate_all(
        &self,
        alerts: Vec<Alert>,
        prices: &HashMap<String, FixedPoint>,
        report: &mut TickReport,
    ) -> Vec<(Alert, Decision)> {
        let mut pending = Vec::new();

        for alert in alerts {
            let Some(&price) = prices.get(&alert.symbol) else {
                continue;
            };

            let decision = evaluate(
                price,
                alert.baseline_price,
                alert.step,
                self.config.first_observation,
            );

            match decision.outcome {
                Outcome::Hold => continue,
                Outcome::Fire => report.fired += 1,
                Outcome::Initialize => report.initialized += 1,
            }
            pending.push((alert, decision));
        }

        pending
    }

    /// Write advanced baselines in order. An alert removed or edited since
    /// it was loaded is skipped; a backend failure aborts the rest. Only
    /// committed fires are returned for delivery.
    async fn persist(
        &self,
        pending: Vec<(Alert, Decision)>,
        report: &mut TickReport,
    ) -> Vec<PriceMove> {
        let now = Utc::now();
        let mut moves = Vec::new();

        for (alert, decision) in pending {
            match self
                .store
                .update_baseline(&alert, decision.new_baseline, now)
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_alert_scoped() => {
                    debug!(
                        alert_id = %alert.id,
                        symbol = %alert.symbol,
                        error = %e,
                        "Alert changed during tick, skipping"
                    );
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!(
                        alert_id = %alert.id,
                        symbol = %alert.symbol,
                        error = %e,
                        "Failed to persist baseline, aborting remaining writes this tick"
                    );
                    report.store_failed = true;
                    break;
                }
            }
            report.persisted += 1;

            if decision.fire() {
                moves.push(PriceMove::new(&alert, decision.new_baseline, now));
            } else {
                debug!(
                    alert_id = %alert.id,
                    symbol = %alert.symbol,
                    baseline = %decision.new_baseline,
                    "Adopted initial baseline"
                );
            }
        }

        moves
    }

    /// Deliver notifications through a small bounded pool.
    /// Returns (delivered, failed).
    async fn dispatch(&self, moves: Vec<PriceMove>) -> (usize, usize) {
        if moves.is_empty() {
            return (0, 0);
        }
        let concurrency = self.config.notify_concurrency.max(1);

        let results: Vec<bool> = stream::iter(moves.into_iter().map(|price_move| {
            let notifier = Arc::clone(&self.notifier);
            async move {
                match notifier.send(&price_move).await {
                    Ok(()) => {
                        info!(
                            owner = %price_move.owner,
                            symbol = %price_move.symbol,
                            price = %price_move.price,
                            "Alert sent"
                        );
                        true
                    }
                    Err(e) => {
                        warn!(
                            owner = %price_move.owner,
                            alert_id = %price_move.alert_id,
                            error = %e,
                            "Failed to send alert"
                        );
                        false
                    }
                }
            }
        }))
        .buffer_unordered(concurrency)
        .collect()
        .await;

        let delivered = results.iter().filter(|ok| **ok).count();
        (delivered, results.len() - delivered)
    }
}
