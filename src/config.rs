//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (private key, RPC URL) are referenced by env-var name in the
//! config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::types::{Asset, AssetPair};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub wallet: WalletConfig,
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    pub grid: GridSettings,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WalletConfig {
    /// Env var holding the base58-encoded secret key.
    pub private_key_env: String,
    /// Env var holding the RPC URL.
    pub rpc_url_env: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EndpointsConfig {
    pub price_url: String,
    pub quote_url: String,
    pub swap_url: String,
    pub limit_order_url: String,
    pub block_engine_url: String,
    pub tip_stream_url: String,
    pub explorer_url: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            price_url: "https://price.jup.ag/v6/price".into(),
            quote_url: "https://quote-api.jup.ag/v6/quote".into(),
            swap_url: "https://quote-api.jup.ag/v6/swap".into(),
            limit_order_url: "https://jup.ag/api/limit/v1".into(),
            block_engine_url: "https://mainnet.block-engine.jito.wtf/api/v1/bundles".into(),
            tip_stream_url: "ws://bundles-api-rest.jito.wtf/api/v1/bundles/tip_stream".into(),
            explorer_url: "https://explorer.jito.wtf/bundle".into(),
        }
    }
}

/// User-facing grid settings. Also persisted by `storage`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GridSettings {
    pub token_a: Asset,
    pub token_b: Asset,
    /// Distance between market and order prices, in percent.
    pub spread_pct: f64,
    /// Delay between monitor checks.
    pub monitor_delay_ms: u64,
    /// Emergency exit when the portfolio falls below this USD value (0 disables).
    pub stop_loss_usd: f64,
    /// Ceiling on the relay tip, in SOL.
    pub max_tip_sol: f64,
    /// Target USD value of token B.
    pub target_value_usd: f64,
}

impl GridSettings {
    pub fn spread_bps(&self) -> f64 {
        self.spread_pct * 100.0
    }

    pub fn pair(&self) -> AssetPair {
        AssetPair {
            a: self.token_a.clone(),
            b: self.token_b.clone(),
        }
    }

    pub fn monitor_delay(&self) -> Duration {
        Duration::from_millis(self.monitor_delay_ms)
    }

    /// Reject settings the controller cannot trade with.
    pub fn validate(&self) -> Result<()> {
        if !(self.spread_pct > 0.0 && self.spread_pct < 100.0) {
            anyhow::bail!("spread_pct must be between 0 and 100, got {}", self.spread_pct);
        }
        if self.monitor_delay_ms < 100 {
            anyhow::bail!("monitor_delay_ms must be at least 100, got {}", self.monitor_delay_ms);
        }
        if self.max_tip_sol < 0.00001 {
            anyhow::bail!("max_tip_sol must be at least 0.00001 SOL, got {}", self.max_tip_sol);
        }
        if self.stop_loss_usd < 0.0 {
            anyhow::bail!("stop_loss_usd cannot be negative");
        }
        if self.target_value_usd <= self.stop_loss_usd {
            anyhow::bail!(
                "target_value_usd ({}) must exceed stop_loss_usd ({})",
                self.target_value_usd,
                self.stop_loss_usd
            );
        }
        if self.token_b.decimals < self.token_a.decimals {
            anyhow::bail!(
                "token B ({}) must have at least as many decimals as token A ({})",
                self.token_b.symbol,
                self.token_a.symbol
            );
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RelayConfig {
    /// Maximum transactions per bundle accepted by the block engine.
    pub max_bundle_len: usize,
    /// Tip used when the tip stream is unavailable, in SOL.
    pub default_tip_sol: f64,
    pub tip_timeout_secs: u64,
    /// Total `sendBundle` attempts (initial + retries).
    pub max_send_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub backoff_jitter: f64,
    pub tip_accounts: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_bundle_len: 5,
            default_tip_sol: 0.00005,
            tip_timeout_secs: 21,
            max_send_attempts: 6,
            backoff_base_ms: 500,
            backoff_cap_ms: 5_000,
            backoff_jitter: 0.3,
            tip_accounts: [
                "96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5",
                "HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe",
                "Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY",
                "ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49",
                "DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh",
                "ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt",
                "DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumKUiL2KRL",
                "3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimingConfig {
    pub landing_checks: u32,
    pub poll_interval_ms: u64,
    pub order_settle_checks: u32,
    pub quiescence_ms: u64,
    pub price_sample_delay_ms: u64,
    pub post_place_pause_ms: u64,
    pub order_op_pause_ms: u64,
    pub task_max_attempts: u32,
    pub monitor_max_errors: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            landing_checks: 30,
            poll_interval_ms: 1_000,
            order_settle_checks: 30,
            quiescence_ms: 5_000,
            price_sample_delay_ms: 1_000,
            post_place_pause_ms: 5_000,
            order_op_pause_ms: 2_000,
            task_max_attempts: 20,
            monitor_max_errors: 20,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.grid.validate()?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Resolve the wallet secret without leaving it in a plain `String`.
    pub fn resolve_private_key(&self) -> Result<SecretString> {
        Self::resolve_env(&self.wallet.private_key_env).map(SecretString::new)
    }
}
