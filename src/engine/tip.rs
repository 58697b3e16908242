//! Relay tip estimation.
//!
//! Reads the 50th-percentile landed tip from the tip feed, falling back to a
//! fixed default on error, timeout or a null reading. The result is clamped
//! to the configured ceiling, converted to lamports and marked up 10%.
//! Nothing is cached: every bundle asks again.

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::platforms::TipFeed;

const LAMPORTS_PER_SOL: Decimal = dec!(1000000000);

/// Markup over the observed percentile.
const TIP_MARKUP: Decimal = dec!(1.1);

pub struct TipEstimator {
    feed: Arc<dyn TipFeed>,
    default_tip_sol: f64,
    max_tip_sol: f64,
    timeout: Duration,
}

impl TipEstimator {
    pub fn new(
        feed: Arc<dyn TipFeed>,
        default_tip_sol: f64,
        max_tip_sol: f64,
        timeout: Duration,
    ) -> Self {
        Self {
            feed,
            default_tip_sol,
            max_tip_sol,
            timeout,
        }
    }

    /// Tip in SOL before markup: feed value or default, clamped to the max.
    pub async fn tip_sol(&self) -> f64 {
        let observed = match tokio::time::timeout(self.timeout, self.feed.p50_tip_sol()).await {
            Ok(Ok(Some(tip))) if tip.is_finite() && tip > 0.0 => tip,
            Ok(Ok(_)) => {
                warn!(default = self.default_tip_sol, "Tip feed reported no percentile, using default");
                self.default_tip_sol
            }
            Ok(Err(e)) => {
                warn!(error = %e, default = self.default_tip_sol, "Tip feed failed, using default");
                self.default_tip_sol
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.timeout.as_secs_f64(),
                    default = self.default_tip_sol,
                    "Tip feed timed out, using default"
                );
                self.default_tip_sol
            }
        };
        debug!(observed, max = self.max_tip_sol, "Tip percentile read");
        observed.min(self.max_tip_sol)
    }

    /// Tip to pay, in lamports.
    pub async fn estimate_lamports(&self) -> u64 {
        let sol = self.tip_sol().await;
        let lamports = to_lamports_with_markup(sol);
        info!(tip_sol = lamports as f64 / 1e9, "Relay tip");
        lamports
    }
}

/// `floor(round(sol × 1e9) × 1.1)`.
pub fn to_lamports_with_markup(sol: f64) -> u64 {
    let Some(sol) = Decimal::from_f64(sol) else {
        return 0;
    };
    let lamports = (sol * LAMPORTS_PER_SOL).round();
    (lamports * TIP_MARKUP).floor().to_u64().unwrap_or(0)
}
