//! Emergency stop-loss.
//!
//! The portfolio is valued as `balance_a + balance_b × price` (A is the
//! USD-pegged quote asset). Falling below the configured floor is fatal.

use tracing::error;

use crate::types::GridError;

#[derive(Debug, Clone, Copy)]
pub struct StopLoss {
    /// USD floor. Zero disables the check.
    threshold_usd: f64,
}

impl StopLoss {
    pub fn new(threshold_usd: f64) -> Self {
        Self { threshold_usd }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold_usd
    }

    /// Mark-to-market value of both balances at `price_b`.
    pub fn portfolio_value(balance_a: f64, balance_b: f64, price_b: f64) -> f64 {
        balance_a + balance_b * price_b
    }

    /// Fail with `StopLoss` when `total_usd` is under the floor.
    pub fn check(&self, total_usd: f64) -> Result<(), GridError> {
        if self.threshold_usd > 0.0 && total_usd < self.threshold_usd {
            error!(
                total = format!("${total_usd:.2}"),
                stop_loss = format!("${:.2}", self.threshold_usd),
                "Emergency stop loss triggered"
            );
            return Err(GridError::StopLoss {
                total: total_usd,
                stop_loss: self.threshold_usd,
            });
        }
        Ok(())
    }
}
