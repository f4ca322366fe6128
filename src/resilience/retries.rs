//! Bounded retry combinator.
//!
//! # Responsibilities
//! - Run an operation up to `max_attempts` times
//! - Ask the caller whether a failure is retryable
//! - Give the caller a hook to repair state between attempts
//!
//! # Design Decisions
//! - No sleeping between attempts: sequence mismatches are fixed by a fresh
//!   account query, not by waiting
//! - The last error is returned unchanged so its code survives

use std::future::Future;

/// Run `op` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` builds have been made.
///
/// `op` receives the 1-based attempt number. `on_retry` runs after a retryable
/// failure and before the next attempt; it is not called after the final one.
/// A `max_attempts` of 0 is treated as 1.
pub async fn attempt<T, E, Op, Fut, Retry, Hook>(
    mut op: Op,
    should_retry: Retry,
    mut on_retry: Hook,
    max_attempts: u32,
) -> Result<T, E>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Retry: Fn(&E) -> bool,
    Hook: FnMut(u32, &E),
{
    let max_attempts = max_attempts.max(1);
    let mut n = 1;

    loop {
        match op(n).await {
            Ok(value) => return Ok(value),
            Err(err) if n < max_attempts && should_retry(&err) => {
                on_retry(n, &err);
                n += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
