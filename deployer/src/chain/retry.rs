// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::ChainError;

/// Exponential backoff for transient chain failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            min_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2,
        }
    }
}

impl RetryPolicy {
    pub fn no_delay(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_factor: 1,
        }
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.backoff_factor.max(1).saturating_pow(exponent);
        self.min_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, ChainError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ChainError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(what, attempt, ?delay, error = %err, "transient failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delays_grow_and_saturate() {
        let policy = RetryPolicy {
            max_attempts: 10,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
            backoff_factor: 3,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(300));
        assert_eq!(policy.delay_for(3), Duration::from_millis(900));
        assert_eq!(policy.delay_for(4), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(40), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn retries_transient_failures_only() {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;
        let value = RetryPolicy::no_delay(3)
            .run("flaky read", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ChainError::Transport("connection reset".into()))
                } else {
                    Ok(7)
                }
            })
            .await
            .expect("third attempt succeeds");
        assert_eq!(value, 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        let reverts = AtomicU32::new(0);
        let counter = &reverts;
        let err = RetryPolicy::no_delay(3)
            .run("reverting call", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ChainError::reverted("nope"))
            })
            .await
            .expect_err("reverts are final");
        assert_eq!(err, ChainError::reverted("nope"));
        assert_eq!(reverts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;
        let err = RetryPolicy::no_delay(2)
            .run("dead node", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ChainError::Timeout("receipt".into()))
            })
            .await
            .expect_err("exhausted");
        assert!(err.is_transient());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
