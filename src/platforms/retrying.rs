//! Retry policy for the limit-order API.
//!
//! Wraps any [`OrderBook`] so every call is retried with a fixed pause.
//! Exhaustion surfaces as `GridError::OrderOpFailed`, which aborts only the
//! current cycle.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::OrderBook;
use crate::engine::retry::with_pause;
use crate::types::{GridError, OrderIntent, UnsignedTransaction};

/// Attempts at listing open orders.
pub const LIST_ATTEMPTS: u32 = 5;

/// Attempts at building a create-order transaction.
pub const CREATE_ATTEMPTS: u32 = 5;

/// Attempts at building a cancel transaction.
pub const CANCEL_ATTEMPTS: u32 = 10;

pub struct RetryingOrderBook {
    inner: Arc<dyn OrderBook>,
    pause: Duration,
}

impl RetryingOrderBook {
    pub fn new(inner: Arc<dyn OrderBook>, pause: Duration) -> Self {
        Self { inner, pause }
    }
}

#[async_trait]
impl OrderBook for RetryingOrderBook {
    async fn open_orders(&self) -> Result<Vec<String>, GridError> {
        let orders = with_pause("openOrders", LIST_ATTEMPTS, self.pause, || {
            self.inner.open_orders()
        })
        .await?;
        debug!(count = orders.len(), "Fetched open orders");
        Ok(orders)
    }

    async fn create_order(&self, intent: &OrderIntent) -> Result<UnsignedTransaction, GridError> {
        with_pause("createOrder", CREATE_ATTEMPTS, self.pause, || {
            self.inner.create_order(intent)
        })
        .await
    }

    async fn cancel_orders(&self, order_ids: &[String]) -> Result<UnsignedTransaction, GridError> {
        with_pause("cancelOrders", CANCEL_ATTEMPTS, self.pause, || {
            self.inner.cancel_orders(order_ids)
        })
        .await
    }
}
