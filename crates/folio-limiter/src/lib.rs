//! Per-client token-bucket rate limiting over the shared cache.
//!
//! Buckets live in the cache keyed by the caller's address hash, so a remote
//! KV backend shares limiter state across processes. A cache outage fails
//! open: requests are allowed and the outage is logged, never surfaced.

use std::sync::Arc;

use folio_core::cache::{Cache, TokenBucket};
use folio_core::config::LimiterConfig;
use serde::Serialize;
use tracing::warn;

/// Outcome of a limiter check, mirrored into response headers by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u64,
    /// Seconds until one token is available. Set only on denial.
    pub retry_after_secs: Option<u64>,
}

impl RateLimitDecision {
    fn fail_open() -> Self {
        Self {
            allowed: true,
            remaining: 0,
            retry_after_secs: None,
        }
    }
}

pub struct RateLimiter {
    cache: Arc<dyn Cache>,
    capacity: f64,
    refill_rate: f64,
    ttl_secs: u64,
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn Cache>, config: &LimiterConfig) -> Self {
        Self {
            cache,
            capacity: config.capacity,
            refill_rate: config.refill_rate,
            ttl_secs: config.ttl_secs,
        }
    }

    /// Take one token from `key`'s bucket, refilling for elapsed time first.
    pub async fn consume(&self, key: &str) -> RateLimitDecision {
        let now = chrono::Utc::now().timestamp_millis();

        let bucket = match self.cache.get_token_bucket(key).await {
            Ok(bucket) => bucket,
            Err(e) => {
                warn!(key, error = %e, "rate limiter cache read failed; allowing request");
                return RateLimitDecision::fail_open();
            }
        };
        let mut bucket = self.refilled(bucket, now);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            self.write_back(key, bucket).await;
            RateLimitDecision {
                allowed: true,
                remaining: bucket.tokens.floor() as u64,
                retry_after_secs: None,
            }
        } else {
            let retry_after = ((1.0 - bucket.tokens) / self.refill_rate).ceil() as u64;
            self.write_back(key, bucket).await;
            RateLimitDecision {
                allowed: false,
                remaining: 0,
                retry_after_secs: Some(retry_after.max(1)),
            }
        }
    }

    /// Forecast the bucket state without consuming or writing back.
    pub async fn peek(&self, key: &str) -> RateLimitDecision {
        let now = chrono::Utc::now().timestamp_millis();

        let bucket = match self.cache.get_token_bucket(key).await {
            Ok(bucket) => bucket,
            Err(e) => {
                warn!(key, error = %e, "rate limiter cache read failed; allowing request");
                return RateLimitDecision::fail_open();
            }
        };
        let bucket = self.refilled(bucket, now);

        if bucket.tokens >= 1.0 {
            RateLimitDecision {
                allowed: true,
                remaining: bucket.tokens.floor() as u64,
                retry_after_secs: None,
            }
        } else {
            let retry_after = ((1.0 - bucket.tokens) / self.refill_rate).ceil() as u64;
            RateLimitDecision {
                allowed: false,
                remaining: 0,
                retry_after_secs: Some(retry_after.max(1)),
            }
        }
    }

    /// Apply elapsed-time refill, clamped to capacity. A missing bucket
    /// starts full.
    fn refilled(&self, bucket: Option<TokenBucket>, now_ms: i64) -> TokenBucket {
        match bucket {
            Some(bucket) => {
                let elapsed_secs = (now_ms - bucket.last_refill).max(0) as f64 / 1000.0;
                TokenBucket {
                    tokens: (bucket.tokens + elapsed_secs * self.refill_rate).min(self.capacity),
                    last_refill: now_ms,
                }
            }
            None => TokenBucket {
                tokens: self.capacity,
                last_refill: now_ms,
            },
        }
    }

    async fn write_back(&self, key: &str, bucket: TokenBucket) {
        if let Err(e) = self
            .cache
            .set_token_bucket(key, bucket, self.ttl_secs)
            .await
        {
            warn!(key, error = %e, "rate limiter cache write failed");
        }
    }
}
