//! Bundle submission and landing confirmation.
//!
//! 1. Snapshot balances and open orders (strictly before the POST).
//! 2. `sendBundle` with exponential backoff on rate limiting.
//! 3. Poll for landing: a balance change, or the relay reporting the bundle
//!    as landed.
//! 4. For order-changing tasks, wait for the open-order set to change.
//! 5. Quiescence delay, then classify by task kind.
//!
//! Landing is an approximation: any balance change counts, whether or not
//! it was caused by this bundle.

use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{RelayConfig, TimingConfig};
use crate::platforms::{BalanceReader, BundleRelay, BundleStatus, OrderBook, RelayError};
use crate::types::{Bundle, GridError, PortfolioSnapshot, Task, TaskResult};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SubmitPolicy {
    /// Total `sendBundle` attempts.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Jitter as a fraction of the base delay.
    pub backoff_jitter: f64,
    pub landing_checks: u32,
    pub poll_interval: Duration,
    pub order_settle_checks: u32,
    pub quiescence: Duration,
}

impl SubmitPolicy {
    pub fn from_config(relay: &RelayConfig, timing: &TimingConfig) -> Self {
        Self {
            max_attempts: relay.max_send_attempts,
            backoff_base: Duration::from_millis(relay.backoff_base_ms),
            backoff_cap: Duration::from_millis(relay.backoff_cap_ms),
            backoff_jitter: relay.backoff_jitter,
            landing_checks: timing.landing_checks,
            poll_interval: Duration::from_millis(timing.poll_interval_ms),
            order_settle_checks: timing.order_settle_checks,
            quiescence: Duration::from_millis(timing.quiescence_ms),
        }
    }

    /// Delay before retry `retry` (0-based), without jitter: `min(base × 2^retry, cap)`.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.backoff_base
            .saturating_mul(factor)
            .min(self.backoff_cap)
    }

    /// `base_delay` plus up to `backoff_jitter` of itself.
    pub fn jittered_delay(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        let jitter = rand::thread_rng().gen_range(0.0..=self.backoff_jitter.max(0.0));
        base + base.mul_f64(jitter)
    }
}

// ---------------------------------------------------------------------------
// Submitter
// ---------------------------------------------------------------------------

/// What the polling phase observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct LandingObservation {
    balance_changed: bool,
    relay_landed: bool,
}

impl LandingObservation {
    fn landed(&self) -> bool {
        self.balance_changed || self.relay_landed
    }
}

pub struct BundleSubmitter {
    relay: Arc<dyn BundleRelay>,
    balances: Arc<dyn BalanceReader>,
    orders: Arc<dyn OrderBook>,
    policy: SubmitPolicy,
}

impl BundleSubmitter {
    pub fn new(
        relay: Arc<dyn BundleRelay>,
        balances: Arc<dyn BalanceReader>,
        orders: Arc<dyn OrderBook>,
        policy: SubmitPolicy,
    ) -> Self {
        Self {
            relay,
            balances,
            orders,
            policy,
        }
    }

    /// Submit `bundle` on behalf of `task` and classify the outcome.
    pub async fn submit(&self, task: Task, bundle: &Bundle) -> Result<TaskResult, GridError> {
        let encoded = bundle.encode()?;

        let before = self.balances.snapshot().await?;
        let orders_before: HashSet<String> =
            self.orders.open_orders().await?.into_iter().collect();

        let bundle_id = self.send_with_backoff(&encoded).await?;
        info!(%task, url = %self.relay.explorer_url(&bundle_id), "Bundle submitted");

        let observed = self.await_landing(&bundle_id, &before).await;
        if observed.landed() {
            info!(%task, "Bundle landed");
            if task != Task::Rebalance {
                self.await_order_change(&orders_before).await;
            }
        } else {
            warn!(%task, checks = self.policy.landing_checks, "No landing observed");
        }

        tokio::time::sleep(self.policy.quiescence).await;

        let result = match task {
            Task::Rebalance => {
                if observed.landed() {
                    TaskResult::Succeeded
                } else {
                    TaskResult::RetryableFailure(task.failure())
                }
            }
            Task::Cancel | Task::PlacePair => match self.orders.open_orders().await {
                Ok(open) => classify_orders(task, open.len()),
                Err(e) => {
                    warn!(%task, error = %e, "Could not read open orders after submission");
                    TaskResult::RetryableFailure(task.failure())
                }
            },
        };
        info!(%task, %result, "Bundle outcome");
        Ok(result)
    }

    /// POST the bundle, backing off on rate limiting. Returns the bundle id.
    pub async fn send_with_backoff(&self, encoded: &[String]) -> Result<String, GridError> {
        let attempts = self.policy.max_attempts.max(1);
        for attempt in 0..attempts {
            match self.relay.send_bundle(encoded).await {
                Ok(id) => return Ok(id),
                Err(RelayError::Rejected(msg)) => return Err(GridError::RelayRejected(msg)),
                Err(RelayError::RateLimited) if attempt + 1 < attempts => {
                    let delay = self.policy.jittered_delay(attempt);
                    warn!(
                        attempt = attempt + 1,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Relay rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(RelayError::RateLimited) => break,
            }
        }
        Err(GridError::RelayRateLimited { attempts })
    }

    async fn await_landing(&self, bundle_id: &str, before: &PortfolioSnapshot) -> LandingObservation {
        let mut observed = LandingObservation::default();
        for check in 1..=self.policy.landing_checks {
            tokio::time::sleep(self.policy.poll_interval).await;

            match self.relay.bundle_status(bundle_id).await {
                Ok(BundleStatus::Landed { slot }) => {
                    debug!(slot, "Relay reports bundle landed");
                    observed.relay_landed = true;
                }
                Ok(BundleStatus::Failed(reason)) => {
                    warn!(%reason, "Relay reports bundle failed");
                    return observed;
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "Bundle status unavailable"),
            }

            match self.balances.snapshot().await {
                Ok(now) if now.balances_differ(before) => {
                    debug!(check, "Balance change observed");
                    observed.balance_changed = true;
                    return observed;
                }
                Ok(_) => {}
                Err(e) => warn!(check, error = %e, "Balance check failed during landing poll"),
            }

            if observed.relay_landed {
                return observed;
            }
        }
        observed
    }

    async fn await_order_change(&self, before: &HashSet<String>) {
        for check in 1..=self.policy.order_settle_checks {
            match self.orders.open_orders().await {
                Ok(now) if now.iter().cloned().collect::<HashSet<_>>() != *before => {
                    debug!(check, "Open orders updated");
                    return;
                }
                Ok(_) => {}
                Err(e) => warn!(check, error = %e, "Order check failed while settling"),
            }
            tokio::time::sleep(self.policy.poll_interval).await;
        }
    }
}

fn classify_orders(task: Task, open_orders: usize) -> TaskResult {
    let ok = match task {
        Task::Cancel => open_orders == 0,
        Task::PlacePair => open_orders == 2,
        Task::Rebalance => return TaskResult::Unknown,
    };
    if ok {
        TaskResult::Succeeded
    } else {
        TaskResult::RetryableFailure(task.failure())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
