//! Task controller.
//!
//! Turns a `Task` into a signed bundle, submits it, and re-prepares the
//! matching task on every retryable failure. At most `max_attempts`
//! preparations run per invocation; exhausting them is fatal.
//!
//! Preparation routines:
//! - `Cancel`: cancel every open order (nothing to do if none are open).
//! - `PlacePair`: cancel whatever is open and create the buy + sell pair
//!   from the session's grid plan, each with a fresh base key.
//! - `Rebalance`: market swap toward the target value of B (nothing to do
//!   if already within tolerance).

use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use std::sync::Arc;
use tracing::{info, warn};

use super::accountant::SessionState;
use super::bundle::BundleBuilder;
use super::retry::{self, RetryError, Step};
use super::shutdown::Shutdown;
use super::submitter::BundleSubmitter;
use super::tip::TipEstimator;
use crate::platforms::solana::Wallet;
use crate::platforms::Venue;
use crate::strategy::{plan_rebalance, RebalanceDecision};
use crate::types::{Bundle, GridError, SignedTransaction, Task, TaskResult};

/// What a preparation routine produced.
pub enum Prepared {
    /// The task's goal already holds.
    NothingToDo,
    Bundle(Bundle),
}

/// Final outcome of a successful controller invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskOutcome {
    pub attempts: u32,
    /// Whether a bundle actually landed (false when there was nothing to do).
    pub submitted: bool,
}

pub struct TaskController {
    venue: Venue,
    wallet: Arc<Wallet>,
    builder: BundleBuilder,
    tips: TipEstimator,
    submitter: BundleSubmitter,
    target_value_usd: f64,
    max_attempts: u32,
    shutdown: Shutdown,
}

impl TaskController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        venue: Venue,
        wallet: Arc<Wallet>,
        builder: BundleBuilder,
        tips: TipEstimator,
        submitter: BundleSubmitter,
        target_value_usd: f64,
        max_attempts: u32,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            venue,
            wallet,
            builder,
            tips,
            submitter,
            target_value_usd,
            max_attempts,
            shutdown,
        }
    }

    /// Drive `task` to success or a terminal error.
    pub async fn run(&self, task: Task, session: &SessionState) -> Result<TaskOutcome, GridError> {
        let outcome = retry::bounded(self.max_attempts, task, move |current, attempt| {
            self.attempt(current, attempt, session)
        })
        .await;

        match outcome {
            Ok(outcome) => {
                info!(%task, attempts = outcome.attempts, "Task succeeded");
                Ok(outcome)
            }
            Err(RetryError::Exhausted { last, attempts }) => {
                warn!(%task, %last, attempts, "Task retries exhausted");
                Err(GridError::ExhaustedRetries { task: last, attempts })
            }
            Err(RetryError::Failed(e)) => Err(e),
        }
    }

    async fn attempt(
        &self,
        task: Task,
        attempt: u32,
        session: &SessionState,
    ) -> Result<Step<Task, TaskOutcome>, GridError> {
        if attempt > 1 {
            info!(%task, attempt, max = self.max_attempts, "Retrying task");
        }

        let bundle = match self.prepare(task, session).await? {
            Prepared::NothingToDo => {
                info!(%task, "Nothing to do");
                return Ok(Step::Done(TaskOutcome {
                    attempts: attempt,
                    submitted: false,
                }));
            }
            Prepared::Bundle(bundle) => bundle,
        };

        match self.submitter.submit(task, &bundle).await? {
            TaskResult::Succeeded => Ok(Step::Done(TaskOutcome {
                attempts: attempt,
                submitted: true,
            })),
            TaskResult::RetryableFailure(reason) => {
                warn!(%task, %reason, attempt, "Task did not take effect");
                Ok(Step::Retry(reason.task()))
            }
            TaskResult::Unknown => Err(GridError::UnknownTaskState(task)),
        }
    }

    /// Build the bundle for `task`, or report there is nothing to do.
    pub async fn prepare(&self, task: Task, session: &SessionState) -> Result<Prepared, GridError> {
        match task {
            Task::Cancel => self.prepare_cancel().await,
            Task::PlacePair => self.prepare_pair(session).await,
            Task::Rebalance => self.prepare_rebalance(session).await,
        }
    }

    async fn prepare_cancel(&self) -> Result<Prepared, GridError> {
        let open = self.venue.orders.open_orders().await?;
        if open.is_empty() {
            return Ok(Prepared::NothingToDo);
        }
        info!(count = open.len(), "Cancelling open orders");
        let cancel = self.signed_cancel(&open).await?;
        self.finish(vec![cancel]).await.map(Prepared::Bundle)
    }

    async fn prepare_pair(&self, session: &SessionState) -> Result<Prepared, GridError> {
        if self.shutdown.is_triggered() {
            return Err(GridError::Shutdown);
        }
        let plan = session
            .plan
            .as_ref()
            .ok_or_else(|| GridError::InvalidSizing("no grid plan for this cycle".into()))?;

        let mut transactions = Vec::with_capacity(3);
        let open = self.venue.orders.open_orders().await?;
        if !open.is_empty() {
            info!(count = open.len(), "Replacing open orders");
            transactions.push(self.signed_cancel(&open).await?);
        }

        for leg in [&plan.buy, &plan.sell] {
            let base = Keypair::new();
            let intent = leg.with_base(base.pubkey());
            let unsigned = self.venue.orders.create_order(&intent).await?;
            info!(order = %intent, "Order built");
            transactions.push(self.wallet.sign(&unsigned, &[&base], None)?);
        }

        self.finish(transactions).await.map(Prepared::Bundle)
    }

    async fn prepare_rebalance(&self, session: &SessionState) -> Result<Prepared, GridError> {
        if self.shutdown.is_triggered() {
            return Err(GridError::Shutdown);
        }
        let snapshot = self.venue.balances.snapshot().await?;
        let swap = match plan_rebalance(&snapshot, &session.pair, self.target_value_usd)? {
            RebalanceDecision::Balanced => return Ok(Prepared::NothingToDo),
            RebalanceDecision::Swap(swap) => swap,
        };

        let unsigned = self
            .venue
            .swaps
            .swap_transaction(&swap.input.mint, &swap.output.mint, swap.amount)
            .await?;
        let signed = self.wallet.sign(&unsigned, &[], None)?;
        self.finish(vec![signed]).await.map(Prepared::Bundle)
    }

    async fn signed_cancel(&self, open: &[String]) -> Result<SignedTransaction, GridError> {
        let unsigned = self.venue.orders.cancel_orders(open).await?;
        let blockhash = self.venue.chain.latest_blockhash().await?;
        self.wallet.sign(&unsigned, &[], Some(blockhash))
    }

    /// Price the tip and close the bundle.
    async fn finish(&self, transactions: Vec<SignedTransaction>) -> Result<Bundle, GridError> {
        let tip = self.tips.estimate_lamports().await;
        let blockhash = self.venue.chain.latest_blockhash().await?;
        self.builder.build(transactions, tip, blockhash)
    }
}
