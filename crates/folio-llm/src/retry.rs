//! Retry with exponential backoff for transient provider failures.
//!
//! Only errors classified by [`is_retryable_error`] are retried; everything
//! else propagates immediately. The delay schedule is
//! `min(max, initial * multiplier^attempt)` plus a small jitter.

use std::time::Duration;

use tracing::warn;

use crate::provider::LlmError;

/// HTTP statuses worth another attempt.
const RETRYABLE_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

/// Message fragments that indicate a transient transport failure.
const RETRYABLE_FRAGMENTS: &[&str] = &[
    "rate limit",
    "network",
    "connection",
    "econnrefused",
    "enotfound",
    "etimedout",
    "timeout",
    "fetch failed",
    "socket hang up",
];

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }
}

/// Run `f`, retrying retryable failures up to `policy.max_retries` times.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, mut f: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, LlmError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_retries && is_retryable_error(&e) => {
                let delay = delay_for_attempt(policy, attempt);
                warn!(
                    attempt = attempt + 1,
                    max = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retryable provider error, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Classify an error as worth retrying.
pub fn is_retryable_error(error: &LlmError) -> bool {
    match error {
        LlmError::RateLimited { .. } => true,
        LlmError::Api { status, .. } => RETRYABLE_STATUSES.contains(status),
        LlmError::Http(e) => {
            e.is_timeout() || e.is_connect() || message_is_retryable(&e.to_string())
        }
        LlmError::Unavailable(message) => message_is_retryable(message),
        LlmError::Parse(_) | LlmError::CircuitOpen { .. } => false,
    }
}

fn message_is_retryable(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRYABLE_FRAGMENTS.iter().any(|frag| lower.contains(frag))
}

/// Exponential delay capped at `max_delay_ms`, with up to 10% jitter derived
/// from the monotonic clock (no rand dependency).
fn delay_for_attempt(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base = (policy.initial_delay_ms as f64 * policy.multiplier.powi(attempt as i32))
        .min(policy.max_delay_ms as f64) as u64;
    Duration::from_millis(base + jitter_ms(base))
}

fn jitter_ms(base_ms: u64) -> u64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);

    let max_jitter = base_ms / 10;
    if max_jitter == 0 {
        return 0;
    }
    (nanos as u64) % max_jitter
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn retryable_statuses_classified() {
        for status in [429u16, 500, 502, 503, 504] {
            assert!(
                is_retryable_error(&LlmError::Api {
                    status,
                    message: String::new()
                }),
                "status {status} should be retryable"
            );
        }
        for status in [400u16, 401, 403] {
            assert!(
                !is_retryable_error(&LlmError::Api {
                    status,
                    message: String::new()
                }),
                "status {status} must not be retryable"
            );
        }
    }

    #[test]
    fn transient_messages_classified() {
        for msg in [
            "rate limit exceeded",
            "Network is unreachable",
            "connection reset by peer",
            "ECONNREFUSED",
            "getaddrinfo ENOTFOUND host",
            "ETIMEDOUT",
            "request timeout",
            "fetch failed",
            "socket hang up",
        ] {
            assert!(
                is_retryable_error(&LlmError::Unavailable(msg.to_string())),
                "{msg} should be retryable"
            );
        }
        assert!(!is_retryable_error(&LlmError::Unavailable(
            "invalid api key".to_string()
        )));
    }

    #[test]
    fn rate_limited_and_circuit_open_classified() {
        assert!(is_retryable_error(&LlmError::RateLimited {
            retry_after_ms: 1000
        }));
        assert!(!is_retryable_error(&LlmError::CircuitOpen {
            provider: "openai".to_string()
        }));
        assert!(!is_retryable_error(&LlmError::Parse("bad json".to_string())));
    }

    #[test]
    fn delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_delay_ms: 100,
            max_delay_ms: 350,
            multiplier: 2.0,
        };
        // Jitter adds at most 10%, so compare against base bounds.
        assert!(delay_for_attempt(&policy, 0).as_millis() >= 100);
        assert!(delay_for_attempt(&policy, 1).as_millis() >= 200);
        assert!(delay_for_attempt(&policy, 4).as_millis() <= 350 + 35);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_retries: 3,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            multiplier: 2.0,
        };

        let result = with_retry(&policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(LlmError::Api {
                        status: 503,
                        message: "unavailable".to_string(),
                    })
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_propagates_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Result<(), _> = with_retry(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(LlmError::Api {
                    status: 401,
                    message: "unauthorized".to_string(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_return_last_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_retries: 2,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            multiplier: 2.0,
        };

        let result: Result<(), _> = with_retry(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(LlmError::Api {
                    status: 502,
                    message: "bad gateway".to_string(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(LlmError::Api { status: 502, .. })));
        // Initial attempt plus two retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
