// src/retry.rs
// =============================================================================
// This module re-runs a failing network operation until it works, or until
// we decide it never will.
//
// How it works:
// 1. Call the operation
// 2. On success, hand the value straight back
// 3. On failure, ask the caller's predicate "is this worth another try?"
// 4. If yes and we still have attempts left, wait (exponential backoff) and
//    go back to 1. Otherwise return the error.
//
// The attempt count is always bounded, so a dead network turns into a
// reported failure instead of an endless loop.
//
// Rust concepts:
// - Generics with closures: FnMut() -> Future lets us retry any async call
// - Fn(&E) -> bool: the caller decides which errors are transient
// =============================================================================

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How many times to try and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first call too, and is clamped to at least 1
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Delay to wait after the given (1-indexed) failed attempt
    ///
    /// base, 2*base, 4*base, ... capped at max_delay
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// runs out of attempts
///
/// Example:
///   execute_with_retry(&policy, || fetcher.fetch_text(url), FetchError::is_transient).await
pub async fn execute_with_retry<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= policy.max_attempts || !is_retryable(&error) {
                    return Err(error);
                }

                let delay = policy.delay_after(attempt);
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why FnMut() -> Fut instead of just a Future?
//    - A future can only be awaited once
//    - To try again we need a fresh future, so we take a closure that makes one
//
// 2. Why is the predicate a separate argument?
//    - Only the caller knows which errors are worth retrying
//    - A timeout probably is, a malformed URL never will be
//
// 3. What does saturating_mul do?
//    - Multiplies, but sticks at the maximum instead of overflowing
// -----------------------------------------------------------------------------
