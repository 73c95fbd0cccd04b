//! Bounded retry loop used for lock acquisition.

use std::future::Future;
use std::time::Duration;
use tracing::trace;

/// Attempt limit and inter-attempt delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before giving up, at least one is always made
    pub max_attempts: u32,
    /// Sleep between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a new policy.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

/// Result of a single attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt<T> {
    /// Finished with a value.
    Done(T),
    /// Try again after the policy delay.
    Retry,
}

/// Run `op` until it finishes, fails, or the attempt limit is reached.
///
/// Returns `Ok(None)` when every attempt asked for a retry. Errors end the loop
/// immediately. `op` receives the 1-based attempt number. The loop has no
/// cancellation hook of its own; wrap it in `tokio::time::timeout` for a
/// deadline.
///
/// # Examples
///
/// ```
/// use armature_mongo_session::retry::{Attempt, RetryPolicy, retry_bounded};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let policy = RetryPolicy::new(5, Duration::ZERO);
/// let found: Result<Option<u32>, ()> = retry_bounded(&policy, |attempt| async move {
///     Ok(if attempt == 3 { Attempt::Done(attempt) } else { Attempt::Retry })
/// })
/// .await;
/// assert_eq!(found, Ok(Some(3)));
/// # });
/// ```
pub async fn retry_bounded<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<Option<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Attempt<T>, E>>,
{
    let mut attempt = 1;
    loop {
        if let Attempt::Done(value) = op(attempt).await? {
            return Ok(Some(value));
        }

        if attempt >= policy.max_attempts {
            return Ok(None);
        }

        trace!(attempt = attempt, delay = ?policy.delay, "Retrying");
        attempt += 1;
        tokio::time::sleep(policy.delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy::new(20, Duration::from_secs(1));
        let start = tokio::time::Instant::now();

        let result: Result<Option<()>, ()> = retry_bounded(&policy, move |_| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Attempt::Retry)
        })
        .await;

        assert_eq!(result, Ok(None));
        assert_eq!(calls.load(Ordering::SeqCst), 20);
        // no sleep after the final attempt
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(19) && elapsed < Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_stops_immediately() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy::new(20, Duration::from_secs(1));

        let result: Result<Option<()>, &str> = retry_bounded(&policy, move |_| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("boom")
        })
        .await;

        assert_eq!(result, Err("boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        let result: Result<Option<u8>, ()> =
            retry_bounded(&policy, |_| async { Ok(Attempt::Done(7)) }).await;
        assert_eq!(result, Ok(Some(7)));
    }
}
