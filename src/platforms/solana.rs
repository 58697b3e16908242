//! Solana RPC access and wallet signing.
//!
//! Balances and blockhashes are read over plain JSON-RPC with `reqwest`.
//! USD valuation routes each balance through the Jupiter quote API into
//! USDC (USDC itself is valued 1:1).
//!
//! The wallet keypair is loaded once at startup and only ever read.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use solana_sdk::hash::Hash;
use solana_sdk::message::{v0, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use solana_sdk::system_instruction;
use solana_sdk::transaction::VersionedTransaction;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use super::jupiter::JupiterClient;
use super::{BalanceReader, BlockhashSource};
use crate::types::{Asset, AssetPair, GridError, PortfolioSnapshot, SignedTransaction, UnsignedTransaction};

pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;
const USDC_SCALE: f64 = 1_000_000.0;

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

/// The trading wallet. Signs everything that goes into a bundle.
pub struct Wallet {
    keypair: Keypair,
}

impl Wallet {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    /// Decode a base58 secret key (the format wallets export).
    pub fn from_base58(secret: &SecretString) -> Result<Self> {
        let bytes = bs58::decode(secret.expose_secret().trim())
            .into_vec()
            .context("Private key is not valid base58")?;
        #[allow(deprecated)]
        let keypair = Keypair::from_bytes(&bytes).context("Private key is not a valid keypair")?;
        Ok(Self { keypair })
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// First four and last four characters of the address, for logs.
    pub fn display_address(&self) -> String {
        let addr = self.pubkey().to_string();
        format!("{}...{}", &addr[..4], &addr[addr.len() - 4..])
    }

    /// Sign an aggregator-built transaction.
    ///
    /// `co_signers` are additional required signers (order base keys).
    /// When `blockhash` is given it replaces the one the API embedded.
    pub fn sign(
        &self,
        unsigned: &UnsignedTransaction,
        co_signers: &[&Keypair],
        blockhash: Option<Hash>,
    ) -> Result<SignedTransaction, GridError> {
        let tx: VersionedTransaction = bincode::deserialize(unsigned.as_bytes())
            .map_err(|e| GridError::BundleConstruction(format!("decode transaction: {e}")))?;
        let mut message = tx.message;
        if let Some(hash) = blockhash {
            message.set_recent_blockhash(hash);
        }

        let mut signers: Vec<&Keypair> = Vec::with_capacity(1 + co_signers.len());
        signers.push(&self.keypair);
        signers.extend_from_slice(co_signers);

        let signed = VersionedTransaction::try_new(message, signers.as_slice())
            .map_err(|e| GridError::BundleConstruction(format!("sign transaction: {e}")))?;
        Ok(SignedTransaction::new(signed))
    }

    /// Build and sign a SOL transfer paying the relay tip.
    pub fn tip_transfer(
        &self,
        tip_account: &Pubkey,
        lamports: u64,
        blockhash: Hash,
    ) -> Result<SignedTransaction, GridError> {
        let ix = system_instruction::transfer(&self.pubkey(), tip_account, lamports);
        let message = v0::Message::try_compile(&self.pubkey(), &[ix], &[], blockhash)
            .map_err(|e| GridError::BundleConstruction(format!("compile tip message: {e}")))?;
        let tx = VersionedTransaction::try_new(VersionedMessage::V0(message), &[&self.keypair])
            .map_err(|e| GridError::BundleConstruction(format!("sign tip transfer: {e}")))?;
        Ok(SignedTransaction::new(tx))
    }
}

// ---------------------------------------------------------------------------
// JSON-RPC response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct BlockhashValue {
    blockhash: String,
}

#[derive(Debug, Deserialize)]
struct TokenAccount {
    account: TokenAccountData,
}

#[derive(Debug, Deserialize)]
struct TokenAccountData {
    data: ParsedData,
}

#[derive(Debug, Deserialize)]
struct ParsedData {
    parsed: ParsedInfo,
}

#[derive(Debug, Deserialize)]
struct ParsedInfo {
    info: TokenInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenInfo {
    token_amount: TokenAmount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenAmount {
    #[serde(default)]
    ui_amount: Option<f64>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Solana JSON-RPC client bound to one wallet and asset pair.
pub struct SolanaRpc {
    http: Client,
    rpc_url: String,
    owner: Pubkey,
    pair: AssetPair,
    jupiter: Arc<JupiterClient>,
}

impl SolanaRpc {
    pub fn new(
        rpc_url: String,
        owner: Pubkey,
        pair: AssetPair,
        jupiter: Arc<JupiterClient>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client for Solana RPC")?;

        Ok(Self {
            http,
            rpc_url,
            owner,
            pair,
            jupiter,
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let resp = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("RPC {method} request failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("RPC {method} error {status}: {text}");
        }

        let parsed: RpcResponse<T> = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse RPC {method} response"))?;

        if let Some(err) = parsed.error {
            anyhow::bail!("RPC {method} error {}: {}", err.code, err.message);
        }
        parsed
            .result
            .with_context(|| format!("RPC {method} returned no result"))
    }

    /// Balance of one asset in UI units. Wrapped SOL reads the native balance.
    async fn ui_balance(&self, asset: &Asset) -> Result<f64> {
        if asset.mint == SOL_MINT {
            let lamports: WithContext<u64> = self
                .call("getBalance", json!([self.owner.to_string()]))
                .await?;
            return Ok(lamports.value as f64 / LAMPORTS_PER_SOL);
        }

        let accounts: WithContext<Vec<TokenAccount>> = self
            .call(
                "getTokenAccountsByOwner",
                json!([
                    self.owner.to_string(),
                    { "mint": asset.mint },
                    { "encoding": "jsonParsed" }
                ]),
            )
            .await?;

        Ok(accounts
            .value
            .first()
            .and_then(|a| a.account.data.parsed.info.token_amount.ui_amount)
            .unwrap_or(0.0))
    }

    /// USD value of a UI balance, quoted into USDC.
    async fn usd_value(&self, asset: &Asset, ui_balance: f64) -> Result<f64> {
        if asset.mint == USDC_MINT {
            return Ok(ui_balance);
        }
        let native = asset.to_native(ui_balance) as u64;
        let out = self
            .jupiter
            .quote_out_amount(&asset.mint, USDC_MINT, native)
            .await
            .with_context(|| format!("Failed to value {} in USDC", asset.symbol))?;
        Ok(out as f64 / USDC_SCALE)
    }
}

#[async_trait]
impl BlockhashSource for SolanaRpc {
    async fn latest_blockhash(&self) -> Result<Hash, GridError> {
        let resp: WithContext<BlockhashValue> = self
            .call("getLatestBlockhash", json!([{ "commitment": "confirmed" }]))
            .await
            .map_err(|e| GridError::network("solana-rpc", format!("{e:#}")))?;
        Hash::from_str(&resp.value.blockhash)
            .map_err(|e| GridError::network("solana-rpc", format!("bad blockhash: {e}")))
    }
}

#[async_trait]
impl BalanceReader for SolanaRpc {
    async fn snapshot(&self) -> Result<PortfolioSnapshot, GridError> {
        let net = |e: anyhow::Error| GridError::network("solana-rpc", format!("{e:#}"));

        let balance_a = self.ui_balance(&self.pair.a).await.map_err(net)?;
        let balance_b = self.ui_balance(&self.pair.b).await.map_err(net)?;

        if balance_a == 0.0 {
            return Err(GridError::ZeroBalance(self.pair.a.symbol.clone()));
        }
        if balance_b == 0.0 {
            return Err(GridError::ZeroBalance(self.pair.b.symbol.clone()));
        }

        let usd_value_a = self.usd_value(&self.pair.a, balance_a).await.map_err(net)?;
        let usd_value_b = match self.usd_value(&self.pair.b, balance_b).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, asset = %self.pair.b.symbol, "USD valuation failed");
                return Err(net(e));
            }
        };

        let snapshot = PortfolioSnapshot {
            balance_a,
            balance_b,
            usd_value_a,
            usd_value_b,
        };
        debug!(%snapshot, "Portfolio snapshot");
        Ok(snapshot)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
