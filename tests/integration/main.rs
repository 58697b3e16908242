//! End-to-end tests: the task controller, bundle submitter and runner
//! driven against an in-memory venue with zero-length timings.

mod controller_flows;
mod mock_venue;

use solana_sdk::signature::Keypair;
use std::sync::Arc;
use std::time::Duration;

use gridbot::config::{RelayConfig, TimingConfig};
use gridbot::engine::{
    BundleBuilder, BundleSubmitter, GridRunner, RunnerTiming, SessionState, Shutdown,
    SubmitPolicy, TaskController, TipEstimator,
};
use gridbot::platforms::retrying::RetryingOrderBook;
use gridbot::platforms::solana::Wallet;
use gridbot::platforms::Venue;
use gridbot::strategy::{GridConfig, GridInputs, GridSizer, StopLoss};
use gridbot::types::{Asset, AssetPair};

use mock_venue::MockVenue;

pub const TARGET_USD: f64 = 1000.0;
pub const SPREAD_BPS: f64 = 100.0;

pub fn pair() -> AssetPair {
    AssetPair {
        a: Asset {
            symbol: "USDC".into(),
            mint: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".into(),
            decimals: 6,
        },
        b: Asset {
            symbol: "SOL".into(),
            mint: "So11111111111111111111111111111111111111112".into(),
            decimals: 9,
        },
    }
}

/// Everything a test needs, wired to one mock venue.
pub struct Harness {
    pub mock: MockVenue,
    pub venue: Venue,
    pub wallet: Arc<Wallet>,
    pub shutdown: Shutdown,
    pub relay: RelayConfig,
    pub timing: TimingConfig,
}

impl Harness {
    /// $1000 of USDC and `balance_b` SOL at $150. Order-API calls go
    /// through the production retry policy with no pause.
    pub fn new(balance_b: f64) -> Self {
        let wallet = Arc::new(Wallet::new(Keypair::new()));
        let mock = MockVenue::new(wallet.pubkey(), pair(), 1000.0, balance_b);
        let mut venue = mock.venue();
        venue.orders = Arc::new(RetryingOrderBook::new(venue.orders, Duration::ZERO));
        Self {
            mock,
            venue,
            wallet,
            shutdown: Shutdown::new(),
            relay: RelayConfig {
                backoff_base_ms: 0,
                backoff_cap_ms: 0,
                tip_timeout_secs: 1,
                ..RelayConfig::default()
            },
            timing: TimingConfig {
                landing_checks: 3,
                poll_interval_ms: 0,
                order_settle_checks: 3,
                quiescence_ms: 0,
                price_sample_delay_ms: 0,
                post_place_pause_ms: 0,
                order_op_pause_ms: 0,
                task_max_attempts: 4,
                monitor_max_errors: 3,
            },
        }
    }

    pub fn controller(&self) -> TaskController {
        let builder = BundleBuilder::new(
            self.wallet.clone(),
            &self.relay.tip_accounts,
            self.relay.max_bundle_len,
        )
        .unwrap();
        let tips = TipEstimator::new(
            self.venue.tips.clone(),
            self.relay.default_tip_sol,
            0.0002,
            Duration::from_secs(self.relay.tip_timeout_secs),
        );
        let submitter = BundleSubmitter::new(
            self.venue.relay.clone(),
            self.venue.balances.clone(),
            self.venue.orders.clone(),
            SubmitPolicy::from_config(&self.relay, &self.timing),
        );
        TaskController::new(
            self.venue.clone(),
            self.wallet.clone(),
            builder,
            tips,
            submitter,
            TARGET_USD,
            self.timing.task_max_attempts,
            self.shutdown.clone(),
        )
    }

    pub fn submitter(&self) -> BundleSubmitter {
        BundleSubmitter::new(
            self.venue.relay.clone(),
            self.venue.balances.clone(),
            self.venue.orders.clone(),
            SubmitPolicy::from_config(&self.relay, &self.timing),
        )
    }

    pub fn sizer() -> GridSizer {
        GridSizer::new(GridConfig {
            pair: pair(),
            spread_bps: SPREAD_BPS,
            target_value_usd: TARGET_USD,
        })
    }

    /// Session carrying a grid plan sized from the mock's current balances.
    pub fn planned_session(&self) -> SessionState {
        let (balance_a, balance_b) = self.mock.balances();
        let plan = Self::sizer()
            .plan(&GridInputs {
                price_samples: vec![150.0; 3],
                balance_a,
                balance_b,
            })
            .unwrap();
        let mut session = SessionState::new(pair());
        session.plan = Some(plan);
        session
    }

    pub fn runner(&self, stop_loss_usd: f64) -> GridRunner {
        GridRunner::new(
            self.controller(),
            self.venue.clone(),
            Self::sizer(),
            StopLoss::new(stop_loss_usd),
            RunnerTiming {
                price_sample_delay: Duration::ZERO,
                post_place_pause: Duration::ZERO,
                monitor_delay: Duration::from_millis(1),
                monitor_max_errors: self.timing.monitor_max_errors,
            },
            self.shutdown.clone(),
        )
    }
}
