//! Position Monitor: ticks over every open position on a fixed
//! interval, evaluates take-profit / stop-loss / trailing-stop rules
//! against the current price, and dispatches an exit the moment one
//! triggers.
//!
//! Grounded on `migration_manager.rs`'s `start_monitoring` interval loop
//! (snapshot the active set, then iterate without holding the lock across
//! awaits) and its `get_positions_requiring_exit` priority logic, adapted
//! to the three-rule evaluation order from the position schema.
//!
//! Position Monitor never holds an `ExitExecutor` directly: it depends on
//! the `ExitDispatch` capability instead, avoiding cyclic ownership, since
//! the exit executor in turn needs to read open
//! positions back out of the repository.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

use crate::config::PositionMonitorConfig;
use crate::domain::{Position, PositionStatus};
use crate::metrics::Metrics;
use crate::persistence::PositionRepository;
use crate::price_feed::PriceFeed;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TrailingStop,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::TakeProfit => "take_profit",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TrailingStop => "trailing_stop",
        }
    }
}

#[async_trait]
pub trait ExitDispatch: Send + Sync {
    async fn dispatch_exit(&self, position: Position, reason: ExitReason);
}

pub struct PositionMonitor {
    config: PositionMonitorConfig,
    positions: Arc<dyn PositionRepository>,
    price_feed: Arc<PriceFeed>,
    exits: Arc<dyn ExitDispatch>,
    metrics: Arc<Metrics>,
}

impl PositionMonitor {
    pub fn new(
        config: PositionMonitorConfig,
        positions: Arc<dyn PositionRepository>,
        price_feed: Arc<PriceFeed>,
        exits: Arc<dyn ExitDispatch>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            positions,
            price_feed,
            exits,
            metrics,
        }
    }

    /// Runs forever (cancel the owning task to stop). Each tick snapshots
    /// the open-position set and evaluates every position concurrently,
    /// bounded by `max_concurrent_checks` so a price-feed stall on one
    /// position can't starve the others.
    pub async fn run(&self) {
        let mut ticker = interval(Duration::from_millis(self.config.check_interval_ms));
        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                error!(error = %e, "position monitor tick failed");
            }
        }
    }

    /// Runs a single evaluation pass over every open position. `run` is the
    /// production entry point (an unbounded loop on the configured
    /// interval); this is the same pass exposed for callers that drive
    /// their own scheduling, such as tests and a process-boot catch-up scan.
    pub async fn run_once(&self) -> Result<(), crate::errors::RepositoryError> {
        self.tick().await
    }

    async fn tick(&self) -> Result<(), crate::errors::RepositoryError> {
        let open = self.positions.find_open().await?;
        self.metrics.positions_open.set(open.len() as f64);
        if open.is_empty() {
            return Ok(());
        }
        debug!(count = open.len(), "evaluating open positions");

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_checks.max(1)));
        let mut handles = Vec::with_capacity(open.len());
        for position in open {
            let semaphore = semaphore.clone();
            let price_feed = self.price_feed.clone();
            let exits = self.exits.clone();
            let positions = self.positions.clone();
            let metrics = self.metrics.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                evaluate_and_dispatch(position, &price_feed, positions.as_ref(), exits.as_ref(), &metrics).await;
            }));
        }
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "position evaluation task panicked");
            }
        }
        Ok(())
    }
}

async fn evaluate_and_dispatch(
    mut position: Position,
    price_feed: &PriceFeed,
    positions: &dyn PositionRepository,
    exits: &dyn ExitDispatch,
    metrics: &Metrics,
) {
    if position.status != PositionStatus::Open || !position.has_rule() {
        return;
    }

    let current_price = match price_feed.get_price(&position.token_mint).await {
        Ok(price) => price,
        Err(e) => {
            debug!(mint = %position.token_mint, error = %e, "skipping position check, price unavailable");
            return;
        }
    };

    if current_price > position.highest_observed_price {
        position.highest_observed_price = current_price;
        if let Err(e) = positions.update(&position).await {
            warn!(position_id = position.id, error = %e, "failed to persist trailing-stop ratchet");
        }
    }

    if let Some(reason) = evaluate_rules(&position, current_price) {
        info!(position_id = position.id, reason = reason.as_str(), current_price, "exit triggered");
        metrics.position_exits_total.with_label_values(&[reason.as_str()]).inc();
        exits.dispatch_exit(position, reason).await;
    }
}

/// Evaluation order: stop-loss, then trailing stop, then take-profit --
/// a position that satisfies both stop-loss and
/// take-profit in the same tick exits on stop-loss.
fn evaluate_rules(position: &Position, current_price: f64) -> Option<ExitReason> {
    let entry_price = position.entry_price();
    if entry_price <= 0.0 {
        return None;
    }
    let change_pct = (current_price - entry_price) / entry_price * 100.0;

    if let Some(sl_pct) = position.sl_pct {
        if change_pct <= -sl_pct {
            return Some(ExitReason::StopLoss);
        }
    }
    if let Some(trailing_pct) = position.trailing_stop_pct {
        if position.highest_observed_price > 0.0 {
            let drawdown_pct = (position.highest_observed_price - current_price) / position.highest_observed_price * 100.0;
            if drawdown_pct >= trailing_pct {
                return Some(ExitReason::TrailingStop);
            }
        }
    }
    if let Some(tp_pct) = position.tp_pct {
        if change_pct >= tp_pct {
            return Some(ExitReason::TakeProfit);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_position() -> Position {
        Position {
            id: 1,
            user_id: 1,
            token_mint: "MINT".to_string(),
            entry_amount_in: 1.0,
            entry_amount_out: 100.0,
            tp_pct: Some(50.0),
            sl_pct: Some(20.0),
            trailing_stop_pct: None,
            highest_observed_price: 0.01,
            status: PositionStatus::Open,
        }
    }

    #[test]
    fn take_profit_triggers_above_threshold() {
        let position = base_position();
        // entry_price = 100.0, +50% => 150.0
        assert_eq!(evaluate_rules(&position, 150.0), Some(ExitReason::TakeProfit));
    }

    #[test]
    fn stop_loss_triggers_below_threshold() {
        let position = base_position();
        // -20% => 80.0
        assert_eq!(evaluate_rules(&position, 79.0), Some(ExitReason::StopLoss));
    }

    #[test]
    fn no_rule_triggers_inside_band() {
        let position = base_position();
        assert_eq!(evaluate_rules(&position, 105.0), None);
    }

    #[test]
    fn trailing_stop_measures_drawdown_from_peak() {
        let mut position = base_position();
        position.tp_pct = None;
        position.sl_pct = None;
        position.trailing_stop_pct = Some(10.0);
        position.highest_observed_price = 200.0;
        assert_eq!(evaluate_rules(&position, 179.0), Some(ExitReason::TrailingStop));
        assert_eq!(evaluate_rules(&position, 181.0), None);
    }

    #[test]
    fn trailing_stop_wins_over_take_profit_when_both_satisfied() {
        let mut position = base_position();
        position.trailing_stop_pct = Some(5.0);
        position.highest_observed_price = 160.0;
        // +50% TP satisfied at 150.0, and drawdown from 160 to 150 is > 5%;
        // trailing-stop outranks take-profit in the priority order.
        assert_eq!(evaluate_rules(&position, 150.0), Some(ExitReason::TrailingStop));
    }

    #[test]
    fn stop_loss_wins_over_take_profit_when_both_satisfied() {
        let mut position = base_position();
        position.tp_pct = Some(-10.0); // satisfied by any price >= 90% of entry
        position.sl_pct = Some(20.0);
        // -20% satisfies both the (inverted) take-profit and the stop-loss;
        // stop-loss outranks take-profit.
        assert_eq!(evaluate_rules(&position, 80.0), Some(ExitReason::StopLoss));
    }
}
