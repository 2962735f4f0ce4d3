//! Shared cache abstraction.
//!
//! The in-process [`MemoryCache`] backs every deployment today; the trait
//! exists so a remote KV (with an atomic read-modify-write primitive for the
//! token-bucket helpers) can replace it without touching callers.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("value at {key} is not an integer")]
    NotAnInteger { key: String },
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// A rate-limiter bucket as stored in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenBucket {
    pub tokens: f64,
    /// Epoch milliseconds of the last refill computation.
    pub last_refill: i64,
}

/// Contract shared by the in-process map and any remote KV backend.
///
/// `get_token_bucket`/`set_token_bucket` are named operations because a
/// remote backend must implement them with a CAS or scripting primitive to
/// keep `consume` race-free; the in-process map satisfies this trivially.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> CacheResult<()>;
    async fn del(&self, key: &str) -> CacheResult<()>;
    async fn incr(&self, key: &str) -> CacheResult<i64>;
    /// Delete every key matching `prefix*`. Returns the number removed.
    async fn del_pattern(&self, prefix: &str) -> CacheResult<u64>;
    async fn get_token_bucket(&self, key: &str) -> CacheResult<Option<TokenBucket>>;
    async fn set_token_bucket(
        &self,
        key: &str,
        bucket: TokenBucket,
        ttl_secs: u64,
    ) -> CacheResult<()>;
}

struct Entry {
    value: String,
    /// Epoch milliseconds; `None` means no expiry.
    expires_at: Option<i64>,
}

impl Entry {
    fn expired(&self, now_ms: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now_ms)
    }
}

/// In-process cache: a `DashMap` with per-entry expiry, pruned lazily on
/// access.
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    buckets: DashMap<String, (TokenBucket, i64)>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            buckets: DashMap::new(),
        }
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn expiry(ttl_secs: Option<u64>) -> Option<i64> {
        ttl_secs.map(|ttl| Self::now_ms() + (ttl as i64) * 1000)
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Self::now_ms();
        if let Some(entry) = self.entries.get(key) {
            if !entry.expired(now) {
                return Ok(Some(entry.value.clone()));
            }
        }
        // Expired entries are removed on the read path.
        self.entries.remove_if(key, |_, e| e.expired(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> CacheResult<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Self::expiry(ttl_secs),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str) -> CacheResult<i64> {
        let now = Self::now_ms();
        let mut entry = self.entries.entry(key.to_string()).or_insert(Entry {
            value: "0".to_string(),
            expires_at: None,
        });
        if entry.expired(now) {
            entry.value = "0".to_string();
            entry.expires_at = None;
        }
        let current: i64 = entry
            .value
            .parse()
            .map_err(|_| CacheError::NotAnInteger {
                key: key.to_string(),
            })?;
        let next = current + 1;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn del_pattern(&self, prefix: &str) -> CacheResult<u64> {
        let before = self.entries.len();
        self.entries.retain(|k, _| !k.starts_with(prefix));
        Ok((before - self.entries.len()) as u64)
    }

    async fn get_token_bucket(&self, key: &str) -> CacheResult<Option<TokenBucket>> {
        let now = Self::now_ms();
        if let Some(entry) = self.buckets.get(key) {
            let (bucket, expires_at) = *entry;
            if expires_at > now {
                return Ok(Some(bucket));
            }
        }
        self.buckets.remove_if(key, |_, (_, at)| *at <= now);
        Ok(None)
    }

    async fn set_token_bucket(
        &self,
        key: &str,
        bucket: TokenBucket,
        ttl_secs: u64,
    ) -> CacheResult<()> {
        let expires_at = Self::now_ms() + (ttl_secs as i64) * 1000;
        self.buckets.insert(key.to_string(), (bucket, expires_at));
        Ok(())
    }
}
