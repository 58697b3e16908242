//! Accountant: session state and profit/loss tracking.
//!
//! Holds everything the runner carries between cycles and derives the
//! figures shown on each monitor tick: P&L against the starting balance,
//! market move since start, and how the grid performed relative to the
//! market.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::strategy::GridPlan;
use crate::types::{AssetPair, PortfolioSnapshot};

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Mutable trading state for one process lifetime. Never persisted.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub pair: AssetPair,
    pub initial: Option<PortfolioSnapshot>,
    pub current: Option<PortfolioSnapshot>,
    pub start_price: Option<f64>,
    pub last_price: Option<f64>,
    /// Grid plan the next `PlacePair` task will place.
    pub plan: Option<GridPlan>,
    pub trade_count: u64,
    pub rebalance_count: u64,
    pub started_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(pair: AssetPair) -> Self {
        Self {
            pair,
            initial: None,
            current: None,
            start_price: None,
            last_price: None,
            plan: None,
            trade_count: 0,
            rebalance_count: 0,
            started_at: Utc::now(),
        }
    }

    /// Record a fresh snapshot; the first one becomes the baseline.
    pub fn record_snapshot(&mut self, snapshot: PortfolioSnapshot) {
        if self.initial.is_none() {
            self.initial = Some(snapshot);
        }
        self.current = Some(snapshot);
    }

    /// Record a price; the first one becomes the start price.
    pub fn record_price(&mut self, price: f64) {
        if self.start_price.is_none() {
            self.start_price = Some(price);
        }
        self.last_price = Some(price);
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Figures for one monitor tick.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub start_usd: Decimal,
    pub current_usd: Decimal,
    pub profit_usd: Decimal,
    pub profit_pct: f64,
    pub market_change_pct: f64,
    /// Profit % minus market change %.
    pub performance_delta_pct: f64,
    pub balance_a_change: f64,
    pub balance_b_change: f64,
    pub trades: u64,
    pub rebalances: u64,
    pub elapsed_secs: i64,
}

pub struct Accountant;

impl Accountant {
    /// Derive the report for the current session, if it has a baseline.
    pub fn report(session: &SessionState) -> Option<SessionReport> {
        let initial = session.initial?;
        let current = session.current?;

        let start_total = initial.total_usd();
        let current_total = current.total_usd();
        let profit = current_total - start_total;
        let profit_pct = if start_total > 0.0 {
            profit / start_total * 100.0
        } else {
            0.0
        };

        let market_change_pct = match (session.start_price, session.last_price) {
            (Some(start), Some(last)) if start > 0.0 => (last - start) / start * 100.0,
            _ => 0.0,
        };

        let money = |v: f64| Decimal::from_f64(v).unwrap_or_default().round_dp(2);

        Some(SessionReport {
            start_usd: money(start_total),
            current_usd: money(current_total),
            profit_usd: money(profit),
            profit_pct,
            market_change_pct,
            performance_delta_pct: profit_pct - market_change_pct,
            balance_a_change: current.balance_a - initial.balance_a,
            balance_b_change: current.balance_b - initial.balance_b,
            trades: session.trade_count,
            rebalances: session.rebalance_count,
            elapsed_secs: (Utc::now() - session.started_at).num_seconds(),
        })
    }

    /// Emit the monitor status line.
    pub fn log_status(session: &SessionState) {
        let Some(report) = Self::report(session) else {
            return;
        };
        let pair = &session.pair;
        let (sell_price, buy_price) = session
            .plan
            .as_ref()
            .map(|p| (p.state.up_price, p.state.down_price))
            .unwrap_or_default();

        info!(
            start = format!("${}", report.start_usd),
            current = format!("${}", report.current_usd),
            pnl = format!("${} ({:+.2}%)", report.profit_usd, report.profit_pct),
            market = format!("{:+.2}%", report.market_change_pct),
            delta = format!("{:+.2}%", report.performance_delta_pct),
            a_change = format!("{:+.5} {}", report.balance_a_change, pair.a.symbol),
            b_change = format!("{:+.5} {}", report.balance_b_change, pair.b.symbol),
            sell_at = sell_price,
            buy_at = buy_price,
            trades = report.trades,
            rebalances = report.rebalances,
            uptime_secs = report.elapsed_secs,
            "Grid status"
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
