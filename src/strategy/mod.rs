//! Strategy layer: grid sizing, rebalance planning and the stop-loss guard.
//!
//! Everything here is synchronous and free of I/O; the engine gathers live
//! inputs and feeds them in.

pub mod grid;
pub mod rebalance;
pub mod risk;

pub use grid::{GridConfig, GridInputs, GridPlan, GridSizer, GridState};
pub use rebalance::{plan_rebalance, RebalanceDecision, SwapPlan};
pub use risk::StopLoss;
