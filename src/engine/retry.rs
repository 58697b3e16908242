//! Bounded retry combinator.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::types::GridError;

/// Result of one attempt: finished, or try again from state `S`.
#[derive(Debug, Clone, PartialEq)]
pub enum Step<S, T> {
    Done(T),
    Retry(S),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryError<S> {
    /// Every attempt asked for a retry.
    Exhausted { last: S, attempts: u32 },
    /// An attempt failed outright.
    Failed(GridError),
}

/// Run `step` at most `max_attempts` times, threading the retry state
/// through. Attempts are numbered from 1.
pub async fn bounded<S, T, F, Fut>(
    max_attempts: u32,
    initial: S,
    mut step: F,
) -> Result<T, RetryError<S>>
where
    F: FnMut(S, u32) -> Fut,
    Fut: Future<Output = Result<Step<S, T>, GridError>>,
{
    let mut state = initial;
    for attempt in 1..=max_attempts {
        match step(state, attempt).await.map_err(RetryError::Failed)? {
            Step::Done(value) => return Ok(value),
            Step::Retry(next) => state = next,
        }
    }
    Err(RetryError::Exhausted {
        last: state,
        attempts: max_attempts,
    })
}

/// Call `op` up to `attempts` times with `pause` between failures.
///
/// Every failure is retried. Exhaustion yields `OrderOpFailed` carrying the
/// last error.
pub async fn with_pause<T, F, Fut>(
    label: &str,
    attempts: u32,
    pause: Duration,
    mut op: F,
) -> Result<T, GridError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GridError>>,
{
    let outcome = bounded(attempts, String::new(), |_, attempt| {
        let call = op();
        async move {
            match call.await {
                Ok(value) => Ok(Step::Done(value)),
                Err(e) => {
                    warn!(op = label, attempt, attempts, error = %e, "Order API call failed");
                    if attempt < attempts {
                        tokio::time::sleep(pause).await;
                    }
                    Ok(Step::Retry(e.to_string()))
                }
            }
        }
    })
    .await;

    match outcome {
        Ok(value) => Ok(value),
        Err(RetryError::Exhausted { last, attempts }) => Err(GridError::OrderOpFailed {
            attempts,
            message: format!("{label}: {last}"),
        }),
        Err(RetryError::Failed(e)) => Err(e),
    }
}
