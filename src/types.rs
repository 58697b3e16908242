//! Shared types for the GRIDBOT controller.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that platform, strategy,
//! and engine modules can depend on them without circular references.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::VersionedTransaction;
use std::fmt;

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// A high-level intent handed to the task controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Task {
    /// Cancel every open order owned by the wallet.
    Cancel,
    /// Replace whatever is open with a fresh buy + sell pair.
    PlacePair,
    /// Swap toward the configured target value of asset B.
    Rebalance,
}

impl Task {
    /// The retryable failure reported when this task's bundle did not take effect.
    pub fn failure(&self) -> FailureReason {
        match self {
            Task::Cancel => FailureReason::CancelFail,
            Task::PlacePair => FailureReason::InfinityFail,
            Task::Rebalance => FailureReason::RebalanceFail,
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Cancel => write!(f, "cancel"),
            Task::PlacePair => write!(f, "infinity"),
            Task::Rebalance => write!(f, "rebalance"),
        }
    }
}

/// Why a submitted bundle was judged not to have taken effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    CancelFail,
    InfinityFail,
    RebalanceFail,
}

impl FailureReason {
    /// The task that must be re-prepared to recover from this failure.
    pub fn task(&self) -> Task {
        match self {
            FailureReason::CancelFail => Task::Cancel,
            FailureReason::InfinityFail => Task::PlacePair,
            FailureReason::RebalanceFail => Task::Rebalance,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::CancelFail => write!(f, "cancelFail"),
            FailureReason::InfinityFail => write!(f, "infinityFail"),
            FailureReason::RebalanceFail => write!(f, "rebalanceFail"),
        }
    }
}

/// Outcome of one preparation + submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskResult {
    Succeeded,
    RetryableFailure(FailureReason),
    Unknown,
}

impl fmt::Display for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskResult::Succeeded => write!(f, "succeed"),
            TaskResult::RetryableFailure(reason) => write!(f, "{reason}"),
            TaskResult::Unknown => write!(f, "unknown"),
        }
    }
}

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

/// A tradable SPL token (or wrapped SOL).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    pub mint: String,
    pub decimals: u8,
}

impl Asset {
    /// Native units per whole token (10^decimals).
    pub fn scale(&self) -> f64 {
        10f64.powi(self.decimals as i32)
    }

    /// Convert a UI amount into native units, rounding down.
    pub fn to_native(&self, ui_amount: f64) -> f64 {
        (ui_amount * self.scale()).floor()
    }

    /// Convert native units back into a UI amount.
    pub fn to_ui(&self, native: u64) -> f64 {
        native as f64 / self.scale()
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.symbol, self.mint)
    }
}

/// The two assets a grid trades: A is the quote (USDC), B the volatile asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPair {
    pub a: Asset,
    pub b: Asset,
}

impl fmt::Display for AssetPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.b.symbol, self.a.symbol)
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// One side of a grid, sized in native units but not yet bound to a base key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLeg {
    pub input_amount: u64,
    pub output_amount: u64,
    pub input_mint: String,
    pub output_mint: String,
}

impl OrderLeg {
    /// Bind this leg to the base account that will hold the order.
    pub fn with_base(&self, base: Pubkey) -> OrderIntent {
        OrderIntent {
            input_amount: self.input_amount,
            output_amount: self.output_amount,
            input_mint: self.input_mint.clone(),
            output_mint: self.output_mint.clone(),
            base,
        }
    }
}

/// A fully specified, not-yet-signed limit order request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderIntent {
    pub input_amount: u64,
    pub output_amount: u64,
    pub input_mint: String,
    pub output_mint: String,
    pub base: Pubkey,
}

impl fmt::Display for OrderIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} {} (base {})",
            self.input_amount, self.input_mint, self.output_amount, self.output_mint, self.base
        )
    }
}

// ---------------------------------------------------------------------------
// Transactions & bundles
// ---------------------------------------------------------------------------

/// Serialized transaction bytes returned by an aggregator API, awaiting signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    bytes: Vec<u8>,
}

impl UnsignedTransaction {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// A fully signed transaction. Never mutated after signing.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedTransaction {
    tx: VersionedTransaction,
}

impl SignedTransaction {
    pub fn new(tx: VersionedTransaction) -> Self {
        Self { tx }
    }

    pub fn inner(&self) -> &VersionedTransaction {
        &self.tx
    }

    /// Encode in the relay's wire format (base58 of the bincode bytes).
    pub fn to_base58(&self) -> Result<String, GridError> {
        let bytes = bincode::serialize(&self.tx)
            .map_err(|e| GridError::BundleConstruction(format!("serialize transaction: {e}")))?;
        Ok(bs58::encode(bytes).into_string())
    }
}

/// An atomically submitted group of transactions. The last element is always the tip.
#[derive(Debug, Clone)]
pub struct Bundle {
    transactions: Vec<SignedTransaction>,
}

impl Bundle {
    /// Assemble a bundle from order transactions plus the tip transfer.
    pub fn new(
        mut orders: Vec<SignedTransaction>,
        tip: SignedTransaction,
        max_len: usize,
    ) -> Result<Self, GridError> {
        if orders.is_empty() {
            return Err(GridError::BundleConstruction(
                "bundle has no order transactions to tip for".into(),
            ));
        }
        orders.push(tip);
        if orders.len() > max_len {
            return Err(GridError::BundleConstruction(format!(
                "bundle holds {} transactions, relay accepts at most {max_len}",
                orders.len()
            )));
        }
        Ok(Self { transactions: orders })
    }

    pub fn transactions(&self) -> &[SignedTransaction] {
        &self.transactions
    }

    /// The tip transfer (always the final element).
    pub fn tip(&self) -> Option<&SignedTransaction> {
        self.transactions.last()
    }

    /// Encode every transaction for the relay's `sendBundle` call.
    pub fn encode(&self) -> Result<Vec<String>, GridError> {
        self.transactions.iter().map(SignedTransaction::to_base58).collect()
    }
}

// ---------------------------------------------------------------------------
// Portfolio
// ---------------------------------------------------------------------------

/// Holdings and USD valuation of both tracked assets at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub balance_a: f64,
    pub balance_b: f64,
    pub usd_value_a: f64,
    pub usd_value_b: f64,
}

impl fmt::Display for PortfolioSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "A={:.5} (${:.2}) B={:.5} (${:.2}) total=${:.2}",
            self.balance_a,
            self.usd_value_a,
            self.balance_b,
            self.usd_value_b,
            self.total_usd(),
        )
    }
}

impl PortfolioSnapshot {
    pub fn total_usd(&self) -> f64 {
        self.usd_value_a + self.usd_value_b
    }

    /// Whether either balance differs. USD values are ignored: they move with price.
    pub fn balances_differ(&self, other: &PortfolioSnapshot) -> bool {
        self.balance_a != other.balance_a || self.balance_b != other.balance_b
    }

    /// USD per whole unit of A, if A is held.
    pub fn usd_per_a(&self) -> Option<f64> {
        (self.balance_a > 0.0).then(|| self.usd_value_a / self.balance_a)
    }

    /// USD per whole unit of B, if B is held.
    pub fn usd_per_b(&self) -> Option<f64> {
        (self.balance_b > 0.0).then(|| self.usd_value_b / self.balance_b)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for GRIDBOT.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GridError {
    #[error("Network error ({service}): {message}")]
    Network { service: String, message: String },

    #[error("No price available for {0}")]
    NoPriceAvailable(String),

    #[error("Order operation failed after {attempts} attempts: {message}")]
    OrderOpFailed { attempts: u32, message: String },

    #[error("Insufficient {asset}: need {needed:.0}, have {available:.0} (native units)")]
    InsufficientFunds {
        asset: String,
        needed: f64,
        available: f64,
    },

    #[error("Zero balance of {0}; cannot trade with nothing")]
    ZeroBalance(String),

    #[error("Portfolio worth ${total:.2} is below the target value ${target:.2}")]
    BalanceBelowTarget { total: f64, target: f64 },

    #[error("Stop loss triggered: portfolio ${total:.2} < ${stop_loss:.2}")]
    StopLoss { total: f64, stop_loss: f64 },

    #[error("Invalid grid sizing: {0}")]
    InvalidSizing(String),

    #[error("Bundle construction failed: {0}")]
    BundleConstruction(String),

    #[error("Relay rejected bundle: {0}")]
    RelayRejected(String),

    #[error("Relay still rate limiting after {attempts} attempts")]
    RelayRateLimited { attempts: u32 },

    #[error("Task {task} exhausted {attempts} attempts")]
    ExhaustedRetries { task: Task, attempts: u32 },

    #[error("Task {0} reached an unknown state")]
    UnknownTaskState(Task),

    #[error("Monitor gave up after {0} consecutive errors")]
    MonitorFailed(u32),

    #[error("Shutdown requested")]
    Shutdown,
}

impl GridError {
    pub fn network(service: &str, message: impl fmt::Display) -> Self {
        GridError::Network {
            service: service.to_string(),
            message: message.to_string(),
        }
    }

    /// Fatal errors stop the runner (after a final cancel). The rest abort
    /// only the current cycle.
    pub fn is_fatal(&self) -> bool {
        match self {
            GridError::Network { .. }
            | GridError::NoPriceAvailable(_)
            | GridError::OrderOpFailed { .. }
            | GridError::InvalidSizing(_)
            | GridError::BundleConstruction(_) => false,
            GridError::InsufficientFunds { .. }
            | GridError::ZeroBalance(_)
            | GridError::BalanceBelowTarget { .. }
            | GridError::StopLoss { .. }
            | GridError::RelayRejected(_)
            | GridError::RelayRateLimited { .. }
            | GridError::ExhaustedRetries { .. }
            | GridError::UnknownTaskState(_)
            | GridError::MonitorFailed(_)
            | GridError::Shutdown => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
