//! Jito block-engine integration.
//!
//! - Bundle relay: JSON-RPC `sendBundle` / `getBundleStatuses` over HTTPS
//! - Tip stream: WebSocket feed of recently landed tip percentiles
//!
//! Rate limiting (HTTP 429) is surfaced as `RelayError::RateLimited` so the
//! submitter can back off. Every other failure is a hard rejection.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use super::{BundleRelay, BundleStatus, RelayError, TipFeed};
use crate::types::GridError;

const SERVICE: &str = "jito";

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RpcReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct StatusesResult {
    #[serde(default)]
    value: Vec<Option<StatusEntry>>,
}

#[derive(Debug, Deserialize)]
struct StatusEntry {
    #[serde(default)]
    slot: u64,
    #[serde(default)]
    confirmation_status: Option<String>,
    #[serde(default)]
    err: Option<Value>,
}

/// One tip-floor sample from the stream. Only the percentile we tip at is read.
#[derive(Debug, Deserialize)]
struct TipFloor {
    #[serde(default)]
    ema_landed_tips_50th_percentile: Option<f64>,
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

pub struct JitoRelay {
    http: Client,
    block_engine_url: String,
    explorer_url: String,
}

impl JitoRelay {
    pub fn new(block_engine_url: String, explorer_url: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build Jito HTTP client")?;

        Ok(Self {
            http,
            block_engine_url,
            explorer_url,
        })
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<(StatusCode, String)> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let resp = self
            .http
            .post(&self.block_engine_url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Jito {method} request failed"))?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        Ok((status, text))
    }
}

/// Interpret a `sendBundle` HTTP reply.
fn parse_send_reply(status: StatusCode, body: &str) -> Result<String, RelayError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(RelayError::RateLimited);
    }
    if !status.is_success() {
        return Err(RelayError::Rejected(format!("HTTP {status}: {body}")));
    }
    let reply: RpcReply = serde_json::from_str(body)
        .map_err(|e| RelayError::Rejected(format!("unparseable reply: {e}")))?;
    if let Some(err) = reply.error {
        return Err(RelayError::Rejected(err.to_string()));
    }
    match reply.result {
        Some(Value::String(id)) if !id.is_empty() => Ok(id),
        other => Err(RelayError::Rejected(format!("no bundle id in reply: {other:?}"))),
    }
}

/// Interpret a `getBundleStatuses` result for a single bundle.
fn parse_status(result: Value) -> Result<BundleStatus> {
    let statuses: StatusesResult =
        serde_json::from_value(result).context("Unexpected getBundleStatuses shape")?;
    let Some(Some(entry)) = statuses.value.into_iter().next() else {
        return Ok(BundleStatus::Unknown);
    };

    if let Some(err) = entry.err.as_ref().filter(|e| !is_ok_marker(e)) {
        return Ok(BundleStatus::Failed(err.to_string()));
    }
    Ok(match entry.confirmation_status.as_deref() {
        Some("confirmed") | Some("finalized") => BundleStatus::Landed { slot: entry.slot },
        _ => BundleStatus::Pending,
    })
}

/// The relay reports success as `{"Ok": null}`.
fn is_ok_marker(err: &Value) -> bool {
    err.is_null() || err.get("Ok").is_some()
}

#[async_trait]
impl BundleRelay for JitoRelay {
    async fn send_bundle(&self, encoded: &[String]) -> Result<String, RelayError> {
        let (status, body) = self
            .rpc("sendBundle", json!([encoded]))
            .await
            .map_err(|e| RelayError::Rejected(format!("{e:#}")))?;
        let outcome = parse_send_reply(status, &body);
        if outcome == Err(RelayError::RateLimited) {
            debug!("Jito rate limited sendBundle");
        }
        outcome
    }

    async fn bundle_status(&self, bundle_id: &str) -> Result<BundleStatus, GridError> {
        let net = |e: anyhow::Error| GridError::network(SERVICE, format!("{e:#}"));
        let (status, body) = self
            .rpc("getBundleStatuses", json!([[bundle_id]]))
            .await
            .map_err(net)?;
        if !status.is_success() {
            return Err(GridError::network(SERVICE, format!("HTTP {status}: {body}")));
        }
        let reply: RpcReply = serde_json::from_str(&body)
            .map_err(|e| GridError::network(SERVICE, format!("unparseable reply: {e}")))?;
        match reply.result {
            Some(result) => parse_status(result).map_err(net),
            None => Ok(BundleStatus::Unknown),
        }
    }

    fn explorer_url(&self, bundle_id: &str) -> String {
        format!("{}/{}", self.explorer_url.trim_end_matches('/'), bundle_id)
    }
}

// ---------------------------------------------------------------------------
// Tip stream
// ---------------------------------------------------------------------------

/// Reads the first tip-floor message from the Jito WebSocket stream.
pub struct JitoTipStream {
    url: String,
}

impl JitoTipStream {
    pub fn new(url: String) -> Self {
        Self { url }
    }
}

fn parse_tip_message(text: &str) -> Result<Option<f64>> {
    let floors: Vec<TipFloor> =
        serde_json::from_str(text).context("Tip stream message is not a JSON array")?;
    Ok(floors
        .first()
        .and_then(|f| f.ema_landed_tips_50th_percentile))
}

#[async_trait]
impl TipFeed for JitoTipStream {
    async fn p50_tip_sol(&self) -> Result<Option<f64>> {
        let (mut ws, _) = connect_async(self.url.as_str())
            .await
            .with_context(|| format!("Failed to connect to tip stream {}", self.url))?;

        while let Some(msg) = ws.next().await {
            match msg.context("Tip stream read failed")? {
                Message::Text(text) => {
                    let tip = parse_tip_message(&text);
                    if let Err(e) = ws.close(None).await {
                        warn!(error = %e, "Tip stream close failed");
                    }
                    return tip;
                }
                Message::Close(_) => break,
                _ => continue,
            }
        }
        anyhow::bail!("Tip stream closed before sending a tip floor")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
