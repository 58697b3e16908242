//! External service integrations.
//!
//! Defines the narrow traits the controller drives and provides
//! implementations for:
//! - Jupiter: price API, limit-order API, quote/swap API
//! - Solana RPC: balances, blockhashes, wallet signing
//! - Jito: bundle relay and tip percentile stream
//!
//! `retrying` layers the order-API retry policy over any `OrderBook`.

pub mod jito;
pub mod jupiter;
pub mod retrying;
pub mod solana;

use async_trait::async_trait;
use solana_sdk::hash::Hash;
use std::sync::Arc;

use crate::types::{GridError, OrderIntent, PortfolioSnapshot, UnsignedTransaction};

/// Latest reference price for a token, in USD.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn fetch_price(&self, mint: &str) -> Result<f64, GridError>;
}

/// Holdings and USD valuation of the two tracked assets.
///
/// Implementations fail with `GridError::ZeroBalance` when either balance
/// is exactly zero.
#[async_trait]
pub trait BalanceReader: Send + Sync {
    async fn snapshot(&self) -> Result<PortfolioSnapshot, GridError>;
}

/// Limit-order book for the wallet the client was built for.
#[async_trait]
pub trait OrderBook: Send + Sync {
    /// Public keys of every open order owned by the wallet.
    async fn open_orders(&self) -> Result<Vec<String>, GridError>;

    /// Unsigned transaction creating one limit order.
    async fn create_order(&self, intent: &OrderIntent) -> Result<UnsignedTransaction, GridError>;

    /// Unsigned transaction cancelling the given orders.
    async fn cancel_orders(&self, order_ids: &[String]) -> Result<UnsignedTransaction, GridError>;
}

/// Market swap used for rebalancing.
#[async_trait]
pub trait SwapRouter: Send + Sync {
    async fn swap_transaction(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
    ) -> Result<UnsignedTransaction, GridError>;
}

#[async_trait]
pub trait BlockhashSource: Send + Sync {
    async fn latest_blockhash(&self) -> Result<Hash, GridError>;
}

/// Why a `sendBundle` call did not return a bundle id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// HTTP 429: retry after a backoff.
    RateLimited,
    /// Any other failure: abort immediately.
    Rejected(String),
}

/// Landing status reported by the relay for a bundle id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleStatus {
    /// The relay has no record (yet) or does not expose statuses.
    Unknown,
    Pending,
    Landed { slot: u64 },
    Failed(String),
}

/// Block-building relay accepting atomic bundles.
#[async_trait]
pub trait BundleRelay: Send + Sync {
    /// Submit base58-encoded transactions; returns the relay's bundle id.
    async fn send_bundle(&self, encoded: &[String]) -> Result<String, RelayError>;

    /// Query the landing status of a previously submitted bundle.
    async fn bundle_status(&self, bundle_id: &str) -> Result<BundleStatus, GridError>;

    /// Explorer link for logging.
    fn explorer_url(&self, bundle_id: &str) -> String;
}

/// Stream of recently landed bundle tips.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TipFeed: Send + Sync {
    /// First reported 50th-percentile tip in SOL. `None` when the feed
    /// reports a null percentile.
    async fn p50_tip_sol(&self) -> anyhow::Result<Option<f64>>;
}

/// Every external collaborator the controller needs, shared process-wide.
#[derive(Clone)]
pub struct Venue {
    pub prices: Arc<dyn PriceOracle>,
    pub balances: Arc<dyn BalanceReader>,
    pub orders: Arc<dyn OrderBook>,
    pub swaps: Arc<dyn SwapRouter>,
    pub chain: Arc<dyn BlockhashSource>,
    pub relay: Arc<dyn BundleRelay>,
    pub tips: Arc<dyn TipFeed>,
}
