//! Bundle assembly: order transactions plus a tip transfer to a randomly
//! chosen relay tip account.

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::platforms::solana::Wallet;
use crate::types::{Bundle, GridError, SignedTransaction};

pub struct BundleBuilder {
    wallet: Arc<Wallet>,
    tip_accounts: Vec<Pubkey>,
    max_len: usize,
}

impl BundleBuilder {
    pub fn new(wallet: Arc<Wallet>, tip_accounts: &[String], max_len: usize) -> Result<Self> {
        let tip_accounts = tip_accounts
            .iter()
            .map(|a| Pubkey::from_str(a).with_context(|| format!("Invalid tip account {a}")))
            .collect::<Result<Vec<_>>>()?;
        if tip_accounts.is_empty() {
            anyhow::bail!("At least one tip account is required");
        }
        Ok(Self {
            wallet,
            tip_accounts,
            max_len,
        })
    }

    fn pick_tip_account(&self) -> Result<Pubkey, GridError> {
        self.tip_accounts
            .choose(&mut rand::thread_rng())
            .copied()
            .ok_or_else(|| GridError::BundleConstruction("no tip accounts".into()))
    }

    /// Append a freshly signed tip transfer to `orders`.
    pub fn build(
        &self,
        orders: Vec<SignedTransaction>,
        tip_lamports: u64,
        blockhash: Hash,
    ) -> Result<Bundle, GridError> {
        if orders.is_empty() {
            return Err(GridError::BundleConstruction(
                "refusing to build a tip-only bundle".into(),
            ));
        }
        let tip_account = self.pick_tip_account()?;
        let tip = self.wallet.tip_transfer(&tip_account, tip_lamports, blockhash)?;
        let bundle = Bundle::new(orders, tip, self.max_len)?;
        debug!(
            transactions = bundle.transactions().len(),
            tip_lamports,
            %tip_account,
            "Bundle assembled"
        );
        Ok(bundle)
    }
}
