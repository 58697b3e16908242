//! Rebalance planning.
//!
//! Decides whether the USD value of asset B has drifted far enough from the
//! target to warrant a market swap, and sizes that swap in native units of
//! the asset being sold.

use tracing::{debug, info};

use crate::types::{Asset, AssetPair, GridError, PortfolioSnapshot};

/// Drift from the target (as a fraction) tolerated without swapping.
pub const REBALANCE_TOLERANCE: f64 = 0.03;

/// A market swap that moves B toward its target value.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapPlan {
    pub input: Asset,
    pub output: Asset,
    /// Native units of `input` to swap.
    pub amount: u64,
    /// USD value being moved.
    pub usd_value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RebalanceDecision {
    /// B is within tolerance of the target.
    Balanced,
    Swap(SwapPlan),
}

/// Plan the swap for a snapshot, or report that none is needed.
pub fn plan_rebalance(
    snapshot: &PortfolioSnapshot,
    pair: &AssetPair,
    target_value_usd: f64,
) -> Result<RebalanceDecision, GridError> {
    let total = snapshot.total_usd();
    if total < target_value_usd {
        return Err(GridError::BalanceBelowTarget {
            total,
            target: target_value_usd,
        });
    }

    let drift = (snapshot.usd_value_b - target_value_usd) / target_value_usd;
    if drift.abs() <= REBALANCE_TOLERANCE {
        debug!(drift_pct = drift * 100.0, "B within tolerance, no rebalance");
        return Ok(RebalanceDecision::Balanced);
    }

    let (input, output, usd_value, usd_per_unit, held) = if drift < 0.0 {
        let deficit = target_value_usd - snapshot.usd_value_b;
        let per_a = snapshot
            .usd_per_a()
            .ok_or_else(|| GridError::ZeroBalance(pair.a.symbol.clone()))?;
        (&pair.a, &pair.b, deficit, per_a, snapshot.balance_a)
    } else {
        let surplus = snapshot.usd_value_b - target_value_usd;
        let per_b = snapshot
            .usd_per_b()
            .ok_or_else(|| GridError::ZeroBalance(pair.b.symbol.clone()))?;
        (&pair.b, &pair.a, surplus, per_b, snapshot.balance_b)
    };

    let amount = (usd_value * input.scale() / usd_per_unit).floor();
    let held_native = held * input.scale();
    if amount > held_native {
        return Err(GridError::InsufficientFunds {
            asset: input.symbol.clone(),
            needed: amount,
            available: held_native,
        });
    }

    info!(
        from = %input.symbol,
        to = %output.symbol,
        amount = input.to_ui(amount as u64),
        usd = format!("${usd_value:.2}"),
        "Rebalance required"
    );

    Ok(RebalanceDecision::Swap(SwapPlan {
        input: input.clone(),
        output: output.clone(),
        amount: amount as u64,
        usd_value,
    }))
}
