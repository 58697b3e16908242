//! Trading runner.
//!
//! Startup cancel and baseline, then the cycle loop:
//! cancel → rebalance → snapshot → price samples → stop-loss → size →
//! place pair → settle pause → monitor, repeated whenever the open-order
//! count drifts from two.
//!
//! Fatal errors and shutdown both end in a best-effort final cancel.

use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::accountant::{Accountant, SessionState};
use super::controller::TaskController;
use super::pricing::PriceTracker;
use super::shutdown::Shutdown;
use crate::config::{GridSettings, TimingConfig};
use crate::platforms::Venue;
use crate::strategy::{GridInputs, GridSizer, StopLoss};
use crate::types::{GridError, Task};

/// Price samples averaged per sizing pass.
const PRICE_SAMPLES: usize = 3;

#[derive(Debug, Clone)]
pub struct RunnerTiming {
    pub price_sample_delay: Duration,
    pub post_place_pause: Duration,
    pub monitor_delay: Duration,
    pub monitor_max_errors: u32,
}

impl RunnerTiming {
    pub fn from_config(grid: &GridSettings, timing: &TimingConfig) -> Self {
        Self {
            price_sample_delay: Duration::from_millis(timing.price_sample_delay_ms),
            post_place_pause: Duration::from_millis(timing.post_place_pause_ms),
            monitor_delay: grid.monitor_delay(),
            monitor_max_errors: timing.monitor_max_errors,
        }
    }
}

/// Why the monitor loop handed control back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    /// The open-order count is no longer two: start a new cycle.
    OrdersChanged { open: usize },
}

pub struct GridRunner {
    controller: TaskController,
    venue: Venue,
    sizer: GridSizer,
    prices: PriceTracker,
    stop_loss: StopLoss,
    session: SessionState,
    timing: RunnerTiming,
    shutdown: Shutdown,
}

impl GridRunner {
    pub fn new(
        controller: TaskController,
        venue: Venue,
        sizer: GridSizer,
        stop_loss: StopLoss,
        timing: RunnerTiming,
        shutdown: Shutdown,
    ) -> Self {
        let pair = sizer.config().pair.clone();
        let prices = PriceTracker::new(venue.prices.clone(), pair.b.mint.clone());
        Self {
            controller,
            venue,
            sizer,
            prices,
            stop_loss,
            session: SessionState::new(pair),
            timing,
            shutdown,
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Run until shutdown or a fatal error, then cancel everything.
    pub async fn run(&mut self) -> Result<(), GridError> {
        let result = self.trade().await;
        match &result {
            Err(GridError::Shutdown) => info!("Shutdown requested, cleaning up"),
            Err(e) => error!(error = %e, "Fatal error, cleaning up"),
            Ok(()) => {}
        }
        self.final_cancel().await;

        match result {
            Err(GridError::Shutdown) => Ok(()),
            other => other,
        }
    }

    async fn trade(&mut self) -> Result<(), GridError> {
        loop {
            match self.startup().await {
                Ok(()) => break,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(error = %e, "Startup failed, retrying after monitor delay");
                    if !self.shutdown.sleep(self.timing.monitor_delay).await {
                        return Err(GridError::Shutdown);
                    }
                }
            }
        }

        loop {
            if self.shutdown.is_triggered() {
                return Err(GridError::Shutdown);
            }

            let span = info_span!(
                "cycle",
                n = self.session.trade_count + 1,
                id = %Uuid::new_v4()
            );
            match self.cycle().instrument(span).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(error = %e, "Cycle aborted, retrying after monitor delay");
                    if !self.shutdown.sleep(self.timing.monitor_delay).await {
                        return Err(GridError::Shutdown);
                    }
                    continue;
                }
            }

            let MonitorExit::OrdersChanged { open } = self.monitor().await?;
            info!(open, "Open orders changed, starting a new cycle");
        }
    }

    /// Clear stale orders and record the session baseline.
    pub async fn startup(&mut self) -> Result<(), GridError> {
        self.controller.run(Task::Cancel, &self.session).await?;

        let snapshot = self.venue.balances.snapshot().await?;
        self.session.record_snapshot(snapshot);
        let price = self.prices.current().await?;
        self.session.record_price(price);

        info!(
            %snapshot,
            price,
            stop_loss = self.stop_loss.threshold(),
            "Session baseline recorded"
        );
        Ok(())
    }

    /// One grid cycle: cancel, rebalance, size and place the pair.
    pub async fn cycle(&mut self) -> Result<(), GridError> {
        self.session.trade_count += 1;
        self.session.plan = None;

        self.controller.run(Task::Cancel, &self.session).await?;

        let rebalance = self.controller.run(Task::Rebalance, &self.session).await?;
        if rebalance.submitted {
            self.session.rebalance_count += 1;
        }

        let snapshot = self.venue.balances.snapshot().await?;
        self.session.record_snapshot(snapshot);

        let samples = self
            .prices
            .samples(PRICE_SAMPLES, self.timing.price_sample_delay)
            .await?;
        let average = GridSizer::average_price(&samples)?;
        self.session.record_price(average);

        let total = StopLoss::portfolio_value(snapshot.balance_a, snapshot.balance_b, average);
        info!(total = format!("${total:.2}"), average, "Portfolio valued");
        self.stop_loss.check(total)?;

        let plan = self.sizer.plan(&GridInputs {
            price_samples: samples,
            balance_a: snapshot.balance_a,
            balance_b: snapshot.balance_b,
        })?;
        info!(
            sell_at = plan.state.up_price,
            buy_at = plan.state.down_price,
            sell_qty = plan.state.sell_qty,
            buy_qty = plan.state.buy_qty,
            "Grid planned"
        );
        self.session.plan = Some(plan);

        self.controller.run(Task::PlacePair, &self.session).await?;

        debug!(pause_ms = self.timing.post_place_pause.as_millis() as u64, "Letting orders settle");
        self.shutdown.sleep(self.timing.post_place_pause).await;
        Ok(())
    }

    /// Watch the pair until the open-order count changes.
    pub async fn monitor(&mut self) -> Result<MonitorExit, GridError> {
        let mut errors = 0u32;
        loop {
            if self.shutdown.is_triggered() {
                return Err(GridError::Shutdown);
            }

            self.refresh_valuation().await;
            if let Some(current) = self.session.current {
                self.stop_loss.check(current.total_usd())?;
            }
            Accountant::log_status(&self.session);

            match self.venue.orders.open_orders().await {
                Ok(open) if open.len() == 2 => {
                    errors = 0;
                    debug!("Two open orders, waiting for a fill");
                }
                Ok(open) => return Ok(MonitorExit::OrdersChanged { open: open.len() }),
                Err(e) => {
                    errors += 1;
                    warn!(
                        error = %e,
                        attempt = errors,
                        max = self.timing.monitor_max_errors,
                        "Monitor check failed"
                    );
                    if errors >= self.timing.monitor_max_errors {
                        return Err(GridError::MonitorFailed(errors));
                    }
                }
            }

            if !self.shutdown.sleep(self.timing.monitor_delay).await {
                return Err(GridError::Shutdown);
            }
        }
    }

    /// Re-price the current balances, keeping previous values on failure.
    async fn refresh_valuation(&mut self) {
        let Some(mut current) = self.session.current else {
            return;
        };

        match self.prices.current().await {
            Ok(price_b) => {
                current.usd_value_b = current.balance_b * price_b;
                self.session.record_price(price_b);
            }
            Err(e) => warn!(error = %e, "Keeping previous B valuation"),
        }

        let mint_a = &self.session.pair.a.mint;
        match self.venue.prices.fetch_price(mint_a).await {
            Ok(price_a) => current.usd_value_a = current.balance_a * price_a,
            Err(e) => debug!(error = %e, "Keeping previous A valuation"),
        }

        self.session.current = Some(current);
    }

    async fn final_cancel(&self) {
        info!("Cancelling all open orders before exit");
        match self.controller.run(Task::Cancel, &self.session).await {
            Ok(outcome) => info!(attempts = outcome.attempts, "Final cancel complete"),
            Err(e) => error!(error = %e, "Final cancel failed; orders may remain open"),
        }
    }
}
