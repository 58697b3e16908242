//! Mock venue for integration testing.
//!
//! One in-memory object implementing every external trait the engine
//! drives: prices, balances, the limit-order book, the swap router,
//! blockhashes, the bundle relay and the tip feed. Order and swap effects
//! are staged when their transactions are built and applied when a bundle
//! "lands" (or dropped when landing is switched off).
//!
//! Landing is immediate by default. `set_landing_delay` holds the balance
//! effects back for a number of balance reads and the order effects for a
//! further number of open-order reads.

use async_trait::async_trait;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::Transaction;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use gridbot::platforms::{
    BalanceReader, BlockhashSource, BundleRelay, BundleStatus, OrderBook, PriceOracle,
    RelayError, SwapRouter, TipFeed, Venue,
};
use gridbot::types::{AssetPair, GridError, OrderIntent, PortfolioSnapshot, UnsignedTransaction};

/// SOL deducted from B on every landed bundle (the tip).
pub const LANDED_TIP_SOL: f64 = 0.00001;

#[derive(Debug, Clone)]
enum Staged {
    Cancel(Vec<String>),
    Create,
    Swap { input_mint: String, amount: u64 },
}

/// A landed bundle whose effects are not yet visible.
struct Pending {
    staged: Vec<Staged>,
    balance_reads_left: u32,
    /// `None` keeps the order set unchanged forever.
    order_reads_left: Option<u32>,
    reads: u32,
}

struct State {
    balance_a: f64,
    balance_b: f64,
    price_a: f64,
    price_b: f64,
    open_orders: Vec<String>,
    next_order: u32,
    staged: Vec<Staged>,
    lands: bool,
    status: BundleStatus,
    relay_script: VecDeque<RelayError>,
    orders_error: Option<String>,
    failing_order_reads: Vec<u32>,
    price_failures: u32,
    balance_delay: u32,
    order_delay: Option<u32>,
    pending: Option<Pending>,
    landed_on_read: Option<u32>,
    send_attempts: u32,
    status_calls: u32,
    balance_reads: u32,
    order_reads: u32,
    bundles: Vec<usize>,
}

/// A deterministic venue. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MockVenue {
    owner: Pubkey,
    pair: AssetPair,
    state: Arc<Mutex<State>>,
}

impl MockVenue {
    /// A venue holding `balance_a` of A and `balance_b` of B, with bundles landing.
    pub fn new(owner: Pubkey, pair: AssetPair, balance_a: f64, balance_b: f64) -> Self {
        Self {
            owner,
            pair,
            state: Arc::new(Mutex::new(State {
                balance_a,
                balance_b,
                price_a: 1.0,
                price_b: 150.0,
                open_orders: Vec::new(),
                next_order: 0,
                staged: Vec::new(),
                lands: true,
                status: BundleStatus::Unknown,
                relay_script: VecDeque::new(),
                orders_error: None,
                failing_order_reads: Vec::new(),
                price_failures: 0,
                balance_delay: 0,
                order_delay: Some(0),
                pending: None,
                landed_on_read: None,
                send_attempts: 0,
                status_calls: 0,
                balance_reads: 0,
                order_reads: 0,
                bundles: Vec::new(),
            })),
        }
    }

    /// Wire this mock into every venue slot.
    pub fn venue(&self) -> Venue {
        let me = Arc::new(self.clone());
        Venue {
            prices: me.clone(),
            balances: me.clone(),
            orders: me.clone(),
            swaps: me.clone(),
            chain: me.clone(),
            relay: me.clone(),
            tips: me,
        }
    }

    pub fn set_lands(&self, lands: bool) {
        self.state.lock().unwrap().lands = lands;
    }

    /// Make landed bundles show up on the `balance_reads`-th balance read
    /// after `sendBundle`, and their order changes `order_reads` open-order
    /// reads after that. `None` leaves the order set untouched. Zero
    /// balance reads means immediate landing.
    pub fn set_landing_delay(&self, balance_reads: u32, order_reads: Option<u32>) {
        let mut s = self.state.lock().unwrap();
        s.balance_delay = balance_reads;
        s.order_delay = order_reads;
    }

    pub fn set_status(&self, status: BundleStatus) {
        self.state.lock().unwrap().status = status;
    }

    pub fn set_balances(&self, balance_a: f64, balance_b: f64) {
        let mut s = self.state.lock().unwrap();
        s.balance_a = balance_a;
        s.balance_b = balance_b;
    }

    pub fn set_price_b(&self, price: f64) {
        self.state.lock().unwrap().price_b = price;
    }

    /// Queue relay errors returned before any bundle is accepted.
    pub fn script_relay(&self, errors: impl IntoIterator<Item = RelayError>) {
        self.state.lock().unwrap().relay_script.extend(errors);
    }

    /// Force every open-order query to fail.
    pub fn set_orders_error(&self, msg: &str) {
        self.state.lock().unwrap().orders_error = Some(msg.to_string());
    }

    /// Fail the `n`-th open-order read from now, once.
    pub fn fail_order_read(&self, n: u32) {
        let mut s = self.state.lock().unwrap();
        let at = s.order_reads + n;
        s.failing_order_reads.push(at);
    }

    /// Fail the next `n` price fetches.
    pub fn fail_prices(&self, n: u32) {
        self.state.lock().unwrap().price_failures = n;
    }

    pub fn seed_orders(&self, ids: &[&str]) {
        let mut s = self.state.lock().unwrap();
        s.open_orders = ids.iter().map(|id| id.to_string()).collect();
    }

    /// Simulate one resting order being filled.
    pub fn fill_one(&self) {
        self.state.lock().unwrap().open_orders.pop();
    }

    pub fn open_order_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().open_orders.clone()
    }

    pub fn balances(&self) -> (f64, f64) {
        let s = self.state.lock().unwrap();
        (s.balance_a, s.balance_b)
    }

    pub fn send_attempts(&self) -> u32 {
        self.state.lock().unwrap().send_attempts
    }

    pub fn status_calls(&self) -> u32 {
        self.state.lock().unwrap().status_calls
    }

    pub fn balance_reads(&self) -> u32 {
        self.state.lock().unwrap().balance_reads
    }

    pub fn order_reads(&self) -> u32 {
        self.state.lock().unwrap().order_reads
    }

    /// Balance read (counted from `sendBundle`) on which the last delayed
    /// bundle became visible.
    pub fn landed_on_read(&self) -> Option<u32> {
        self.state.lock().unwrap().landed_on_read
    }

    /// Length of every accepted bundle, in order.
    pub fn bundles(&self) -> Vec<usize> {
        self.state.lock().unwrap().bundles.clone()
    }

    /// A legacy transaction requiring the owner (and optionally a base key) to sign.
    fn unsigned(&self, extra_signer: Option<Pubkey>) -> UnsignedTransaction {
        let mut accounts = vec![AccountMeta::new(self.owner, true)];
        if let Some(base) = extra_signer {
            accounts.push(AccountMeta::new(base, true));
        }
        let ix = Instruction::new_with_bytes(Pubkey::new_unique(), &[7], accounts);
        let msg = Message::new_with_blockhash(&[ix], Some(&self.owner), &Hash::new_unique());
        let tx = Transaction::new_unsigned(msg);
        UnsignedTransaction::new(bincode::serialize(&tx).unwrap())
    }

    /// Swaps and the tip.
    fn apply_balances(&self, s: &mut State, staged: &[Staged]) {
        for effect in staged {
            if let Staged::Swap { input_mint, amount } = effect {
                if *input_mint == self.pair.a.mint {
                    let spent = self.pair.a.to_ui(*amount);
                    s.balance_a -= spent;
                    s.balance_b += spent * s.price_a / s.price_b;
                } else {
                    let spent = self.pair.b.to_ui(*amount);
                    s.balance_b -= spent;
                    s.balance_a += spent * s.price_b / s.price_a;
                }
            }
        }
        s.balance_b -= LANDED_TIP_SOL;
    }

    fn apply_orders(&self, s: &mut State, staged: &[Staged]) {
        for effect in staged {
            match effect {
                Staged::Cancel(ids) => s.open_orders.retain(|id| !ids.contains(id)),
                Staged::Create => {
                    s.next_order += 1;
                    let id = format!("order-{}", s.next_order);
                    s.open_orders.push(id);
                }
                Staged::Swap { .. } => {}
            }
        }
    }
}

#[async_trait]
impl PriceOracle for MockVenue {
    async fn fetch_price(&self, mint: &str) -> Result<f64, GridError> {
        let mut s = self.state.lock().unwrap();
        if s.price_failures > 0 {
            s.price_failures -= 1;
            return Err(GridError::network("price", "503 Service Unavailable"));
        }
        if mint == self.pair.a.mint {
            Ok(s.price_a)
        } else if mint == self.pair.b.mint {
            Ok(s.price_b)
        } else {
            Err(GridError::network("price", format!("unknown mint {mint}")))
        }
    }
}

#[async_trait]
impl BalanceReader for MockVenue {
    async fn snapshot(&self) -> Result<PortfolioSnapshot, GridError> {
        let mut guard = self.state.lock().unwrap();
        let s = &mut *guard;
        s.balance_reads += 1;
        if let Some(mut pending) = s.pending.take() {
            if pending.balance_reads_left > 0 {
                pending.balance_reads_left -= 1;
                pending.reads += 1;
                if pending.balance_reads_left == 0 {
                    self.apply_balances(s, &pending.staged);
                    s.landed_on_read = Some(pending.reads);
                }
            }
            s.pending = Some(pending);
        }
        Ok(PortfolioSnapshot {
            balance_a: s.balance_a,
            balance_b: s.balance_b,
            usd_value_a: s.balance_a * s.price_a,
            usd_value_b: s.balance_b * s.price_b,
        })
    }
}

#[async_trait]
impl OrderBook for MockVenue {
    async fn open_orders(&self) -> Result<Vec<String>, GridError> {
        let mut guard = self.state.lock().unwrap();
        let s = &mut *guard;
        s.order_reads += 1;
        let read = s.order_reads;
        if let Some(pos) = s.failing_order_reads.iter().position(|n| *n == read) {
            s.failing_order_reads.remove(pos);
            return Err(GridError::network("orders", "502 Bad Gateway"));
        }
        if let Some(msg) = &s.orders_error {
            return Err(GridError::network("orders", msg));
        }

        if let Some(mut pending) = s.pending.take() {
            match pending.order_reads_left {
                Some(left) if pending.balance_reads_left == 0 && left <= 1 => {
                    self.apply_orders(s, &pending.staged);
                }
                Some(left) if pending.balance_reads_left == 0 => {
                    pending.order_reads_left = Some(left - 1);
                    s.pending = Some(pending);
                }
                _ => s.pending = Some(pending),
            }
        }
        Ok(s.open_orders.clone())
    }

    async fn create_order(&self, intent: &OrderIntent) -> Result<UnsignedTransaction, GridError> {
        self.state.lock().unwrap().staged.push(Staged::Create);
        Ok(self.unsigned(Some(intent.base)))
    }

    async fn cancel_orders(&self, order_ids: &[String]) -> Result<UnsignedTransaction, GridError> {
        self.state
            .lock()
            .unwrap()
            .staged
            .push(Staged::Cancel(order_ids.to_vec()));
        Ok(self.unsigned(None))
    }
}

#[async_trait]
impl SwapRouter for MockVenue {
    async fn swap_transaction(
        &self,
        input_mint: &str,
        _output_mint: &str,
        amount: u64,
    ) -> Result<UnsignedTransaction, GridError> {
        self.state.lock().unwrap().staged.push(Staged::Swap {
            input_mint: input_mint.to_string(),
            amount,
        });
        Ok(self.unsigned(None))
    }
}

#[async_trait]
impl BlockhashSource for MockVenue {
    async fn latest_blockhash(&self) -> Result<Hash, GridError> {
        Ok(Hash::new_unique())
    }
}

#[async_trait]
impl BundleRelay for MockVenue {
    async fn send_bundle(&self, encoded: &[String]) -> Result<String, RelayError> {
        let mut s = self.state.lock().unwrap();
        s.send_attempts += 1;
        if let Some(err) = s.relay_script.pop_front() {
            return Err(err);
        }

        s.bundles.push(encoded.len());
        let staged = std::mem::take(&mut s.staged);
        if !s.lands {
            return Ok(format!("bundle-{}", s.bundles.len()));
        }
        if s.balance_delay == 0 {
            self.apply_orders(&mut s, &staged);
            self.apply_balances(&mut s, &staged);
        } else {
            s.pending = Some(Pending {
                staged,
                balance_reads_left: s.balance_delay,
                order_reads_left: s.order_delay,
                reads: 0,
            });
        }
        Ok(format!("bundle-{}", s.bundles.len()))
    }

    async fn bundle_status(&self, _bundle_id: &str) -> Result<BundleStatus, GridError> {
        let mut s = self.state.lock().unwrap();
        s.status_calls += 1;
        Ok(s.status.clone())
    }

    fn explorer_url(&self, bundle_id: &str) -> String {
        format!("https://explorer.invalid/bundle/{bundle_id}")
    }
}

#[async_trait]
impl TipFeed for MockVenue {
    async fn p50_tip_sol(&self) -> anyhow::Result<Option<f64>> {
        Ok(Some(0.00002))
    }
}
