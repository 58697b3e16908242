//! Price access with retries and a last-known-price fallback.

use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::platforms::PriceOracle;
use crate::types::GridError;

/// Attempts per price read before falling back.
const PRICE_ATTEMPTS: u32 = 5;

pub struct PriceTracker {
    oracle: Arc<dyn PriceOracle>,
    mint: String,
    last_known: Option<f64>,
}

impl PriceTracker {
    pub fn new(oracle: Arc<dyn PriceOracle>, mint: String) -> Self {
        Self {
            oracle,
            mint,
            last_known: None,
        }
    }

    /// Latest price, retried; the last known price if every attempt fails.
    pub async fn current(&mut self) -> Result<f64, GridError> {
        for attempt in 1..=PRICE_ATTEMPTS {
            match self.oracle.fetch_price(&self.mint).await {
                Ok(price) => {
                    self.last_known = Some(price);
                    return Ok(price);
                }
                Err(e) => warn!(mint = %self.mint, attempt, error = %e, "Price fetch failed"),
            }
        }
        self.last_known
            .ok_or_else(|| GridError::NoPriceAvailable(self.mint.clone()))
    }

    /// `count` prices spaced `spacing` apart.
    pub async fn samples(&mut self, count: usize, spacing: Duration) -> Result<Vec<f64>, GridError> {
        let mut prices = Vec::with_capacity(count);
        for i in 0..count {
            if i > 0 {
                tokio::time::sleep(spacing).await;
            }
            prices.push(self.current().await?);
        }
        Ok(prices)
    }
}
