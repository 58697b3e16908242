//! Task controller and bundle submitter against the mock venue.

use gridbot::engine::{SessionState, TaskOutcome};
use gridbot::platforms::{BundleStatus, RelayError};
use gridbot::types::{GridError, Task};

use crate::{pair, Harness, TARGET_USD};

/// SOL holding worth ~$993 at $150: inside the 3% rebalance tolerance and
/// a valid grid for a $1000 target at a 1% spread.
const BALANCED_B: f64 = 6.62;

/// SOL holding worth $750: $250 short of target.
const SHORT_B: f64 = 5.0;

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cancel_with_no_open_orders_is_immediate() {
    let h = Harness::new(BALANCED_B);
    let outcome = h
        .controller()
        .run(Task::Cancel, &SessionState::new(pair()))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        TaskOutcome {
            attempts: 1,
            submitted: false
        }
    );
    assert_eq!(h.mock.send_attempts(), 0);
}

#[tokio::test]
async fn test_cancel_clears_open_orders() {
    let h = Harness::new(BALANCED_B);
    h.mock.seed_orders(&["stale-1", "stale-2"]);

    let outcome = h
        .controller()
        .run(Task::Cancel, &SessionState::new(pair()))
        .await
        .unwrap();

    assert!(outcome.submitted);
    assert_eq!(outcome.attempts, 1);
    assert!(h.mock.open_order_ids().is_empty());
    // One cancel transaction plus the tip.
    assert_eq!(h.mock.bundles(), vec![2]);
}

#[tokio::test]
async fn test_cancel_that_never_lands_exhausts_retries() {
    let h = Harness::new(BALANCED_B);
    h.mock.seed_orders(&["stuck"]);
    h.mock.set_lands(false);

    let err = h
        .controller()
        .run(Task::Cancel, &SessionState::new(pair()))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        GridError::ExhaustedRetries {
            task: Task::Cancel,
            attempts: 4
        }
    );
    assert!(err.is_fatal());
    assert_eq!(h.mock.send_attempts(), 4);
    assert_eq!(h.mock.open_order_ids(), vec!["stuck".to_string()]);
}

// ---------------------------------------------------------------------------
// Place pair
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_place_pair_lands_two_orders() {
    let h = Harness::new(BALANCED_B);
    let session = h.planned_session();

    let outcome = h.controller().run(Task::PlacePair, &session).await.unwrap();

    assert!(outcome.submitted);
    assert_eq!(h.mock.open_order_ids().len(), 2);
    // Buy, sell, tip.
    assert_eq!(h.mock.bundles(), vec![3]);
}

#[tokio::test]
async fn test_place_pair_replaces_stale_orders() {
    let h = Harness::new(BALANCED_B);
    h.mock.seed_orders(&["stale"]);
    let session = h.planned_session();

    h.controller().run(Task::PlacePair, &session).await.unwrap();

    let open = h.mock.open_order_ids();
    assert_eq!(open.len(), 2);
    assert!(!open.contains(&"stale".to_string()));
    // Cancel, buy, sell, tip.
    assert_eq!(h.mock.bundles(), vec![4]);
}

#[tokio::test]
async fn test_place_pair_without_plan_is_rejected() {
    let h = Harness::new(BALANCED_B);
    let err = h
        .controller()
        .run(Task::PlacePair, &SessionState::new(pair()))
        .await
        .unwrap_err();

    assert!(matches!(err, GridError::InvalidSizing(_)));
    assert!(!err.is_fatal());
    assert_eq!(h.mock.send_attempts(), 0);
}

#[tokio::test]
async fn test_place_pair_refused_after_shutdown() {
    let h = Harness::new(BALANCED_B);
    let session = h.planned_session();
    h.shutdown.trigger();

    let err = h.controller().run(Task::PlacePair, &session).await.unwrap_err();
    assert_eq!(err, GridError::Shutdown);
    assert_eq!(h.mock.send_attempts(), 0);
}

#[tokio::test]
async fn test_cancel_still_runs_after_shutdown() {
    let h = Harness::new(BALANCED_B);
    h.mock.seed_orders(&["left-over"]);
    h.shutdown.trigger();

    let outcome = h
        .controller()
        .run(Task::Cancel, &SessionState::new(pair()))
        .await
        .unwrap();
    assert!(outcome.submitted);
    assert!(h.mock.open_order_ids().is_empty());
}

#[tokio::test]
async fn test_order_read_blip_after_submission_does_not_replace() {
    let h = Harness::new(BALANCED_B);
    let session = h.planned_session();
    // Reads: preparation, pre-send snapshot, settle check, classification.
    h.mock.fail_order_read(4);

    let outcome = h.controller().run(Task::PlacePair, &session).await.unwrap();

    assert_eq!(outcome.attempts, 1);
    assert_eq!(h.mock.bundles(), vec![3]);
    assert_eq!(h.mock.open_order_ids().len(), 2);
    assert_eq!(h.mock.order_reads(), 5);
}

#[tokio::test]
async fn test_order_read_blip_during_preparation_is_retried() {
    let h = Harness::new(BALANCED_B);
    h.mock.seed_orders(&["stale"]);
    h.mock.fail_order_read(1);

    let outcome = h
        .controller()
        .run(Task::Cancel, &SessionState::new(pair()))
        .await
        .unwrap();

    assert_eq!(outcome.attempts, 1);
    assert!(outcome.submitted);
    assert_eq!(h.mock.bundles(), vec![2]);
}

// ---------------------------------------------------------------------------
// Landing detection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_delayed_landing_waits_for_balances_then_orders() {
    let mut h = Harness::new(BALANCED_B);
    h.timing.landing_checks = 5;
    let session = h.planned_session();
    h.mock.set_landing_delay(3, Some(2));

    let outcome = h.controller().run(Task::PlacePair, &session).await.unwrap();

    assert_eq!(outcome.attempts, 1);
    // Landing declared on the third poll, which stops polling.
    assert_eq!(h.mock.landed_on_read(), Some(3));
    assert_eq!(h.mock.status_calls(), 3);
    // Pre-send snapshot plus three polls.
    assert_eq!(h.mock.balance_reads(), 4);
    // Preparation, pre-send, two settle checks, classification.
    assert_eq!(h.mock.order_reads(), 5);
    assert_eq!(h.mock.open_order_ids().len(), 2);
}

#[tokio::test]
async fn test_order_settle_wait_is_bounded() {
    let mut h = Harness::new(BALANCED_B);
    h.timing.task_max_attempts = 1;
    h.mock.seed_orders(&["stuck"]);
    // Balances move but the order set never does.
    h.mock.set_landing_delay(1, None);

    let err = h
        .controller()
        .run(Task::Cancel, &SessionState::new(pair()))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        GridError::ExhaustedRetries {
            task: Task::Cancel,
            attempts: 1
        }
    );
    assert_eq!(h.mock.landed_on_read(), Some(1));
    assert_eq!(h.mock.status_calls(), 1);
    // Preparation, pre-send, three settle checks, classification.
    assert_eq!(h.mock.order_reads(), 6);
    assert_eq!(h.mock.open_order_ids(), vec!["stuck".to_string()]);
}

#[tokio::test]
async fn test_rebalance_skips_order_settle_wait() {
    let h = Harness::new(SHORT_B);
    h.mock.set_landing_delay(2, None);

    let outcome = h
        .controller()
        .run(Task::Rebalance, &SessionState::new(pair()))
        .await
        .unwrap();

    assert!(outcome.submitted);
    assert_eq!(h.mock.landed_on_read(), Some(2));
    // Only the pre-send snapshot of the order set.
    assert_eq!(h.mock.order_reads(), 1);
}

#[tokio::test]
async fn test_landing_after_last_check_is_missed() {
    let mut h = Harness::new(BALANCED_B);
    h.timing.task_max_attempts = 1;
    let session = h.planned_session();
    // One balance read past the three landing checks.
    h.mock.set_landing_delay(4, Some(0));

    let err = h.controller().run(Task::PlacePair, &session).await.unwrap_err();

    assert!(matches!(err, GridError::ExhaustedRetries { task: Task::PlacePair, .. }));
    assert_eq!(h.mock.status_calls(), 3);
    assert_eq!(h.mock.landed_on_read(), None);
}

// ---------------------------------------------------------------------------
// Rebalance
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_balanced_portfolio_needs_no_rebalance() {
    let h = Harness::new(BALANCED_B);
    let outcome = h
        .controller()
        .run(Task::Rebalance, &SessionState::new(pair()))
        .await
        .unwrap();

    assert!(!outcome.submitted);
    assert_eq!(h.mock.send_attempts(), 0);
}

#[tokio::test]
async fn test_rebalance_swaps_toward_target() {
    let h = Harness::new(SHORT_B);
    let outcome = h
        .controller()
        .run(Task::Rebalance, &SessionState::new(pair()))
        .await
        .unwrap();

    assert!(outcome.submitted);
    let (a, b) = h.mock.balances();
    assert!((a - 750.0).abs() < 1e-6);
    assert!((b * 150.0 - TARGET_USD).abs() < 0.01);
}

#[tokio::test]
async fn test_unlanded_rebalance_exhausts_retries() {
    let h = Harness::new(SHORT_B);
    h.mock.set_lands(false);

    let err = h
        .controller()
        .run(Task::Rebalance, &SessionState::new(pair()))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        GridError::ExhaustedRetries {
            task: Task::Rebalance,
            attempts: 4
        }
    );
    assert_eq!(h.mock.balances(), (1000.0, SHORT_B));
}

#[tokio::test]
async fn test_relay_landed_status_counts_as_landing() {
    let h = Harness::new(SHORT_B);
    h.mock.set_lands(false);
    h.mock.set_status(BundleStatus::Landed { slot: 42 });

    let outcome = h
        .controller()
        .run(Task::Rebalance, &SessionState::new(pair()))
        .await
        .unwrap();
    assert!(outcome.submitted);
    assert_eq!(outcome.attempts, 1);
}

#[tokio::test]
async fn test_relay_failed_status_stops_polling() {
    let h = Harness::new(SHORT_B);
    h.mock.set_lands(false);
    h.mock.set_status(BundleStatus::Failed("simulation failed".into()));

    let err = h
        .controller()
        .run(Task::Rebalance, &SessionState::new(pair()))
        .await
        .unwrap_err();

    assert!(matches!(err, GridError::ExhaustedRetries { .. }));
    // One status query per attempt instead of one per landing check.
    assert_eq!(h.mock.status_calls(), 4);
}

#[tokio::test]
async fn test_portfolio_below_target_is_fatal() {
    let h = Harness::new(BALANCED_B);
    // $500 USDC + $150 SOL against a $1000 target.
    h.mock.set_balances(500.0, 1.0);

    let err = h
        .controller()
        .run(Task::Rebalance, &SessionState::new(pair()))
        .await
        .unwrap_err();

    assert!(matches!(err, GridError::BalanceBelowTarget { .. }));
    assert!(err.is_fatal());
    assert_eq!(h.mock.send_attempts(), 0);
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_rate_limit_exhausts_after_six_attempts() {
    let h = Harness::new(BALANCED_B);
    h.mock.script_relay(std::iter::repeat(RelayError::RateLimited).take(10));

    let err = h
        .submitter()
        .send_with_backoff(&["tx".to_string()])
        .await
        .unwrap_err();

    assert_eq!(err, GridError::RelayRateLimited { attempts: 6 });
    assert_eq!(h.mock.send_attempts(), 6);
}

#[tokio::test]
async fn test_rate_limit_then_accepted() {
    let h = Harness::new(BALANCED_B);
    h.mock.seed_orders(&["stale"]);
    h.mock.script_relay([RelayError::RateLimited, RelayError::RateLimited]);

    let outcome = h
        .controller()
        .run(Task::Cancel, &SessionState::new(pair()))
        .await
        .unwrap();

    assert!(outcome.submitted);
    assert_eq!(h.mock.send_attempts(), 3);
    assert!(h.mock.open_order_ids().is_empty());
}

#[tokio::test]
async fn test_rejected_bundle_is_fatal() {
    let h = Harness::new(BALANCED_B);
    h.mock.seed_orders(&["stale"]);
    h.mock
        .script_relay([RelayError::Rejected("bundle contains an expired blockhash".into())]);

    let err = h
        .controller()
        .run(Task::Cancel, &SessionState::new(pair()))
        .await
        .unwrap_err();

    assert!(matches!(err, GridError::RelayRejected(_)));
    assert!(err.is_fatal());
    assert_eq!(h.mock.send_attempts(), 1);
}
