//! GRIDBOT: Jupiter limit-order grid with Jito bundle submission
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores grid settings from disk (or saves the configured ones), wires
//! the venue clients into the task controller, and runs the grid until
//! Ctrl+C or a fatal error. Either way all open orders are cancelled on exit.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use gridbot::config;
use gridbot::engine::{
    BundleBuilder, BundleSubmitter, GridRunner, RunnerTiming, Shutdown, SubmitPolicy,
    TaskController, TipEstimator,
};
use gridbot::platforms::jito::{JitoRelay, JitoTipStream};
use gridbot::platforms::jupiter::JupiterClient;
use gridbot::platforms::retrying::RetryingOrderBook;
use gridbot::platforms::solana::{SolanaRpc, Wallet};
use gridbot::platforms::Venue;
use gridbot::storage;
use gridbot::strategy::{GridConfig, GridSizer, StopLoss};

const BANNER: &str = r#"
  ____ ____  ___ ____  ____   ___ _____
 / ___|  _ \|_ _|  _ \| __ ) / _ \_   _|
| |  _| |_) || || | | |  _ \| | | || |
| |_| |  _ < | || |_| | |_) | |_| || |
 \____|_| \_\___|____/|____/ \___/ |_|

  Jupiter limit-order grid · Jito bundles
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");

    // -- Settings --------------------------------------------------------

    let settings = storage::load_or_init(&cfg.grid, None)?;
    info!(
        pair = %settings.pair(),
        spread_pct = settings.spread_pct,
        target_usd = settings.target_value_usd,
        stop_loss_usd = settings.stop_loss_usd,
        max_tip_sol = settings.max_tip_sol,
        monitor_delay_ms = settings.monitor_delay_ms,
        "GRIDBOT starting up"
    );

    // -- Wallet and venue ------------------------------------------------

    let wallet = Arc::new(Wallet::from_base58(&cfg.resolve_private_key()?)?);
    let rpc_url = config::AppConfig::resolve_env(&cfg.wallet.rpc_url_env)?;
    info!(wallet = %wallet.display_address(), "Wallet loaded");

    let pair = settings.pair();
    let jupiter = Arc::new(JupiterClient::new(cfg.endpoints.clone(), wallet.pubkey())?);
    let orders = Arc::new(RetryingOrderBook::new(
        jupiter.clone(),
        Duration::from_millis(cfg.timing.order_op_pause_ms),
    ));
    let rpc = Arc::new(SolanaRpc::new(
        rpc_url,
        wallet.pubkey(),
        pair.clone(),
        jupiter.clone(),
    )?);
    let relay = Arc::new(JitoRelay::new(
        cfg.endpoints.block_engine_url.clone(),
        cfg.endpoints.explorer_url.clone(),
    )?);
    let tips = Arc::new(JitoTipStream::new(cfg.endpoints.tip_stream_url.clone()));

    let venue = Venue {
        prices: jupiter.clone(),
        balances: rpc.clone(),
        orders,
        swaps: jupiter,
        chain: rpc,
        relay,
        tips,
    };

    // -- Engine ----------------------------------------------------------

    let shutdown = Shutdown::new();

    let builder = BundleBuilder::new(
        wallet.clone(),
        &cfg.relay.tip_accounts,
        cfg.relay.max_bundle_len,
    )
    .context("Invalid relay configuration")?;
    let estimator = TipEstimator::new(
        venue.tips.clone(),
        cfg.relay.default_tip_sol,
        settings.max_tip_sol,
        Duration::from_secs(cfg.relay.tip_timeout_secs),
    );
    let submitter = BundleSubmitter::new(
        venue.relay.clone(),
        venue.balances.clone(),
        venue.orders.clone(),
        SubmitPolicy::from_config(&cfg.relay, &cfg.timing),
    );
    let controller = TaskController::new(
        venue.clone(),
        wallet,
        builder,
        estimator,
        submitter,
        settings.target_value_usd,
        cfg.timing.task_max_attempts,
        shutdown.clone(),
    );

    let sizer = GridSizer::new(GridConfig {
        pair,
        spread_bps: settings.spread_bps(),
        target_value_usd: settings.target_value_usd,
    });
    let mut runner = GridRunner::new(
        controller,
        venue,
        sizer,
        StopLoss::new(settings.stop_loss_usd),
        RunnerTiming::from_config(&settings, &cfg.timing),
        shutdown.clone(),
    );

    // -- Signals ---------------------------------------------------------

    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received.");
                signal.trigger();
            }
            Err(e) => warn!(error = %e, "Could not listen for Ctrl+C"),
        }
    });

    info!("Entering grid loop. Press Ctrl+C to stop.");

    // -- Run -------------------------------------------------------------

    let result = runner.run().await;
    let session = runner.session();
    match &result {
        Ok(()) => info!(
            trades = session.trade_count,
            rebalances = session.rebalance_count,
            "GRIDBOT shut down cleanly."
        ),
        Err(e) => error!(
            error = %e,
            trades = session.trade_count,
            rebalances = session.rebalance_count,
            "GRIDBOT stopped on a fatal error."
        ),
    }

    result.map_err(Into::into)
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gridbot=info"));

    let json_logging = std::env::var("GRIDBOT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
