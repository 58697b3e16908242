//! Infinity-grid sizing.
//!
//! Derives the resting buy/sell pair from three averaged price samples, the
//! current balance of the volatile asset B and the configured target value.
//!
//! Prices bracket the average asymmetrically:
//!
//!   up   = avg × (1 + 1.3 × spread_bps / 10000)
//!   down = avg × (1 − spread_bps / 10000)
//!
//! Quantities (native units of B) are what it takes to bring B back to the
//! target value at each bound, grossed up by the aggregator fee:
//!
//!   sell = floor((B·up − T) / up × 10^decB / 0.998)
//!   buy  = floor((T − B·down) / down × 10^decB / 0.998) − sell
//!
//! Everything here is pure; the same inputs always produce the same plan.

use serde::Serialize;
use tracing::debug;

use crate::types::{AssetPair, GridError, OrderLeg};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Multiplier applied to the spread on the upside only.
const UPSIDE_SKEW: f64 = 1.3;

/// Aggregator fee retained on fills (0.2%).
const FEE_FACTOR: f64 = 0.998;

/// Orders may not spend more than this multiple of the held balance.
const BALANCE_BUFFER: f64 = 1.05;

#[derive(Debug, Clone)]
pub struct GridConfig {
    pub pair: AssetPair,
    pub spread_bps: f64,
    /// Target USD value of asset B.
    pub target_value_usd: f64,
}

// ---------------------------------------------------------------------------
// Sizing
// ---------------------------------------------------------------------------

/// Live inputs for one sizing pass. Balances are UI amounts.
#[derive(Debug, Clone)]
pub struct GridInputs {
    pub price_samples: Vec<f64>,
    pub balance_a: f64,
    pub balance_b: f64,
}

/// Derived prices and native-unit quantities for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridState {
    pub average_price: f64,
    pub up_price: f64,
    pub down_price: f64,
    /// B sold at `up_price` (native B).
    pub sell_qty: i64,
    /// B bought at `down_price` after netting (native B).
    pub buy_qty: i64,
    /// A received for the sell (native A).
    pub sell_proceeds: i64,
    /// A spent on the buy (native A).
    pub buy_cost: i64,
}

/// The pair of orders to place, with the state they were sized from.
#[derive(Debug, Clone, PartialEq)]
pub struct GridPlan {
    pub state: GridState,
    /// A → B at `down_price`.
    pub buy: OrderLeg,
    /// B → A at `up_price`.
    pub sell: OrderLeg,
}

pub struct GridSizer {
    config: GridConfig,
}

impl GridSizer {
    pub fn new(config: GridConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Mean of the price samples. Rejects empty or non-positive input.
    pub fn average_price(samples: &[f64]) -> Result<f64, GridError> {
        if samples.is_empty() {
            return Err(GridError::NoPriceAvailable("no price samples".into()));
        }
        let avg = samples.iter().sum::<f64>() / samples.len() as f64;
        if !avg.is_finite() || avg <= 0.0 {
            return Err(GridError::NoPriceAvailable(format!("bad average price {avg}")));
        }
        Ok(avg)
    }

    /// Compute prices and raw quantities without validating them.
    pub fn state(&self, inputs: &GridInputs) -> Result<GridState, GridError> {
        let cfg = &self.config;
        let avg = Self::average_price(&inputs.price_samples)?;
        let up = avg * (1.0 + (cfg.spread_bps * UPSIDE_SKEW) / 10_000.0);
        let down = avg * (1.0 - cfg.spread_bps / 10_000.0);

        let scale_b = cfg.pair.b.scale();
        let target = cfg.target_value_usd;
        let value_up = inputs.balance_b * up;
        let value_down = inputs.balance_b * down;

        let sell_raw = ((value_up - target) / up * scale_b / FEE_FACTOR).floor() as i64;
        let buy_initial = ((target - value_down) / down * scale_b / FEE_FACTOR).floor() as i64;
        let buy_qty = buy_initial - sell_raw;

        let decimal_diff = 10f64.powi(cfg.pair.b.decimals as i32 - cfg.pair.a.decimals as i32);
        let sell_proceeds = (sell_raw as f64 * up / decimal_diff).floor() as i64;
        let buy_cost = (buy_qty as f64 * down / decimal_diff).floor() as i64;

        Ok(GridState {
            average_price: avg,
            up_price: up,
            down_price: down,
            sell_qty: sell_raw,
            buy_qty,
            sell_proceeds,
            buy_cost,
        })
    }

    /// Size the buy/sell pair.
    ///
    /// Fails fatally with `InsufficientFunds` when either order would spend
    /// more than 105% of the held balance, and with `InvalidSizing` when the
    /// netting rule leaves a non-positive quantity.
    pub fn plan(&self, inputs: &GridInputs) -> Result<GridPlan, GridError> {
        let pair = &self.config.pair;
        let state = self.state(inputs)?;

        let balance_a_native = inputs.balance_a * pair.a.scale();
        let balance_b_native = inputs.balance_b * pair.b.scale();

        if state.sell_qty as f64 > balance_b_native * BALANCE_BUFFER {
            return Err(GridError::InsufficientFunds {
                asset: pair.b.symbol.clone(),
                needed: state.sell_qty as f64,
                available: balance_b_native,
            });
        }
        if state.buy_cost as f64 > balance_a_native * BALANCE_BUFFER {
            return Err(GridError::InsufficientFunds {
                asset: pair.a.symbol.clone(),
                needed: state.buy_cost as f64,
                available: balance_a_native,
            });
        }

        let quantities = [
            ("sell quantity", state.sell_qty),
            ("sell proceeds", state.sell_proceeds),
            ("buy quantity", state.buy_qty),
            ("buy cost", state.buy_cost),
        ];
        for (label, value) in quantities {
            if value <= 0 {
                return Err(GridError::InvalidSizing(format!(
                    "{label} is {value} at avg {:.4} (B balance {}, target ${:.2})",
                    state.average_price, inputs.balance_b, self.config.target_value_usd
                )));
            }
        }

        debug!(
            avg = state.average_price,
            up = state.up_price,
            down = state.down_price,
            sell = state.sell_qty,
            buy = state.buy_qty,
            "Grid sized"
        );

        Ok(GridPlan {
            state,
            buy: OrderLeg {
                input_amount: state.buy_cost as u64,
                output_amount: state.buy_qty as u64,
                input_mint: pair.a.mint.clone(),
                output_mint: pair.b.mint.clone(),
            },
            sell: OrderLeg {
                input_amount: state.sell_qty as u64,
                output_amount: state.sell_proceeds as u64,
                input_mint: pair.b.mint.clone(),
                output_mint: pair.a.mint.clone(),
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
