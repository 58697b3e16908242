//! Core engine: task controller, bundle submission and the trading runner.

pub mod accountant;
pub mod bundle;
pub mod controller;
pub mod pricing;
pub mod retry;
pub mod runner;
pub mod shutdown;
pub mod submitter;
pub mod tip;

pub use accountant::{Accountant, SessionReport, SessionState};
pub use bundle::BundleBuilder;
pub use controller::{Prepared, TaskController, TaskOutcome};
pub use pricing::PriceTracker;
pub use runner::{GridRunner, MonitorExit, RunnerTiming};
pub use shutdown::Shutdown;
pub use submitter::{BundleSubmitter, SubmitPolicy};
pub use tip::TipEstimator;
