//! Jupiter aggregator integration.
//!
//! Three APIs behind one client:
//! - Price API: `GET {price_url}?ids={mint}`
//! - Limit-order API: `openOrders`, `createOrder`, `cancelOrders`
//! - Quote/swap API: market swaps for rebalancing and USD valuation
//!
//! Every transaction-returning endpoint hands back a base64 serialized
//! transaction that the wallet signs before bundling. Calls are made once;
//! the engine reaches the limit-order API through
//! [`RetryingOrderBook`](super::retrying::RetryingOrderBook).

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::{OrderBook, PriceOracle, SwapRouter};
use crate::config::EndpointsConfig;
use crate::types::{GridError, OrderIntent, UnsignedTransaction};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const SERVICE: &str = "jupiter";

/// Slippage used for valuation quotes (never executed).
const VALUATION_SLIPPAGE_BPS: u32 = 50;

/// Ceiling for auto-slippage on rebalance swaps.
const MAX_AUTO_SLIPPAGE_BPS: u32 = 200;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PriceResponse {
    #[serde(default)]
    data: HashMap<String, PriceEntry>,
}

#[derive(Debug, Deserialize)]
struct PriceEntry {
    price: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummary {
    out_amount: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenOrder {
    public_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderRequest {
    owner: String,
    in_amount: u64,
    out_amount: u64,
    input_mint: String,
    output_mint: String,
    expired_at: Option<i64>,
    base: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderResponse {
    tx: String,
    #[serde(default)]
    order_pubkey: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelOrdersRequest {
    owner: String,
    fee_payer: String,
    orders: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CancelOrdersResponse {
    tx: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapRequest {
    quote_response: Value,
    user_public_key: String,
    wrap_and_unwrap_sol: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    swap_transaction: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Jupiter client scoped to one wallet.
pub struct JupiterClient {
    http: Client,
    endpoints: EndpointsConfig,
    owner: Pubkey,
}

impl JupiterClient {
    pub fn new(endpoints: EndpointsConfig, owner: Pubkey) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("gridbot/0.1")
            .build()
            .context("Failed to build Jupiter HTTP client")?;

        Ok(Self {
            http,
            endpoints,
            owner,
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Jupiter API error {status}: {body}");
        }

        resp.json().await.context("Failed to parse Jupiter response")
    }

    async fn post_json<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T> {
        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Jupiter API error {status}: {body}");
        }

        resp.json().await.context("Failed to parse Jupiter response")
    }

    fn quote_url(&self, input_mint: &str, output_mint: &str, amount: u64, slippage: &str) -> String {
        format!(
            "{}?inputMint={}&outputMint={}&amount={}&{}",
            self.endpoints.quote_url,
            urlencoding::encode(input_mint),
            urlencoding::encode(output_mint),
            amount,
            slippage,
        )
    }

    /// Quoted output amount (native units of `output_mint`) for a swap.
    pub async fn quote_out_amount(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
    ) -> Result<u64> {
        let url = self.quote_url(
            input_mint,
            output_mint,
            amount,
            &format!("slippageBps={VALUATION_SLIPPAGE_BPS}"),
        );
        let quote: QuoteSummary = self.get_json(&url).await?;
        quote
            .out_amount
            .parse()
            .with_context(|| format!("Quote outAmount is not an integer: {}", quote.out_amount))
    }
}

/// Decode a base64 transaction returned by any Jupiter endpoint.
fn decode_transaction(encoded: &str) -> Result<UnsignedTransaction> {
    let bytes = BASE64
        .decode(encoded.trim())
        .context("Transaction is not valid base64")?;
    Ok(UnsignedTransaction::new(bytes))
}

#[async_trait]
impl PriceOracle for JupiterClient {
    async fn fetch_price(&self, mint: &str) -> Result<f64, GridError> {
        let url = format!("{}?ids={}", self.endpoints.price_url, urlencoding::encode(mint));
        let resp: PriceResponse = self
            .get_json(&url)
            .await
            .map_err(|e| GridError::network(SERVICE, format!("{e:#}")))?;

        resp.data
            .get(mint)
            .map(|entry| entry.price)
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| GridError::NoPriceAvailable(mint.to_string()))
    }
}

#[async_trait]
impl OrderBook for JupiterClient {
    async fn open_orders(&self) -> Result<Vec<String>, GridError> {
        let url = format!(
            "{}/openOrders?wallet={}",
            self.endpoints.limit_order_url, self.owner
        );
        let orders: Vec<OpenOrder> = self
            .get_json(&url)
            .await
            .map_err(|e| GridError::network(SERVICE, format!("openOrders: {e:#}")))?;
        Ok(orders.into_iter().map(|o| o.public_key).collect())
    }

    async fn create_order(&self, intent: &OrderIntent) -> Result<UnsignedTransaction, GridError> {
        let url = format!("{}/createOrder", self.endpoints.limit_order_url);
        let request = CreateOrderRequest {
            owner: self.owner.to_string(),
            in_amount: intent.input_amount,
            out_amount: intent.output_amount,
            input_mint: intent.input_mint.clone(),
            output_mint: intent.output_mint.clone(),
            expired_at: None,
            base: intent.base.to_string(),
        };

        let net = |e: anyhow::Error| GridError::network(SERVICE, format!("createOrder: {e:#}"));
        let resp: CreateOrderResponse = self.post_json(&url, &request).await.map_err(net)?;
        debug!(order = ?resp.order_pubkey, "Order transaction built");
        decode_transaction(&resp.tx).map_err(net)
    }

    async fn cancel_orders(&self, order_ids: &[String]) -> Result<UnsignedTransaction, GridError> {
        let url = format!("{}/cancelOrders", self.endpoints.limit_order_url);
        let request = CancelOrdersRequest {
            owner: self.owner.to_string(),
            fee_payer: self.owner.to_string(),
            orders: order_ids.to_vec(),
        };

        let net = |e: anyhow::Error| GridError::network(SERVICE, format!("cancelOrders: {e:#}"));
        let resp: CancelOrdersResponse = self.post_json(&url, &request).await.map_err(net)?;
        decode_transaction(&resp.tx).map_err(net)
    }
}

#[async_trait]
impl SwapRouter for JupiterClient {
    async fn swap_transaction(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
    ) -> Result<UnsignedTransaction, GridError> {
        let net = |e: anyhow::Error| GridError::network(SERVICE, format!("{e:#}"));

        let quote_url = self.quote_url(
            input_mint,
            output_mint,
            amount,
            &format!("autoSlippage=true&maxAutoSlippageBps={MAX_AUTO_SLIPPAGE_BPS}"),
        );
        let quote: Value = self.get_json(&quote_url).await.map_err(net)?;

        let request = SwapRequest {
            quote_response: quote,
            user_public_key: self.owner.to_string(),
            wrap_and_unwrap_sol: true,
        };
        let resp: SwapResponse = self
            .post_json(&self.endpoints.swap_url, &request)
            .await
            .map_err(net)?;
        decode_transaction(&resp.swap_transaction).map_err(net)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
