use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TransmitError;

/// Fixed-attempt, fixed-delay retry around a single frame transmission.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub attempts: u32,
    #[serde(with = "mesh_common::utils::duration_ms")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_millis(400),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// One attempt, no delay.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts run out.
    /// Returns the attempt number that succeeded.
    pub async fn run<F, Fut>(&self, mut op: F) -> Result<u32, TransmitError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<(), TransmitError>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(()) => return Ok(attempt),
                Err(e) if attempt < attempts && e.is_retryable() => {
                    debug!("TX attempt {}/{} failed: {}", attempt, attempts, e);
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_common::HwAddress;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_millis(400));

        let result = policy
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(TransmitError::NoAck(HwAddress(1)))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(10));

        let result = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TransmitError::NoAck(HwAddress(2))) }
            })
            .await;

        assert_eq!(result, Err(TransmitError::NoAck(HwAddress(2))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::default()
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TransmitError::PayloadTooLarge { size: 500, max: 256 }) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_transport_fails_on_first_attempt() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();
        let result = RetryPolicy::default()
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TransmitError::Closed) }
            })
            .await;

        assert_eq!(result, Err(TransmitError::Closed));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_delay_serializes_as_millis() {
        let json = serde_json::to_string(&RetryPolicy::default()).unwrap();
        assert_eq!(json, r#"{"attempts":10,"delay":400}"#);
    }
}
