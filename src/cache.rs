//! Process-lifetime TTL cache for hosting-API responses.
//!
//! One explicit instance is constructed at startup and handed to every
//! collaborator that needs it; there is no global singleton. A single mutex
//! per instance guards the whole read-check/write-insert sequence, including
//! the producer await in [`Cache::get_or_fetch`], so two concurrent misses
//! on the same key never run the producer twice.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::Mutex;

struct Entry {
    value: Value,
    expires_at: DateTime<Utc>,
}

pub struct Cache {
    entries: Mutex<HashMap<String, Entry>>,
    default_ttl: Duration,
}

impl Cache {
    pub fn new(default_ttl_secs: u64) -> Self {
        Cache {
            entries: Mutex::new(HashMap::new()),
            default_ttl: Duration::seconds(default_ttl_secs as i64),
        }
    }

    /// Deterministic key from a namespace and ordered arguments. Identical
    /// input always yields the same key, so repeated fetches inside the TTL
    /// window hit.
    pub fn key(namespace: &str, args: &[&str]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(namespace.as_bytes());
        for arg in args {
            hasher.update([0u8]);
            hasher.update(arg.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// Returns the cached value if present and unexpired. An expired entry
    /// is evicted and reported as a miss.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if Utc::now() <= entry.expires_at => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Inserts or overwrites, expiring after `ttl_secs` (default TTL when
    /// `None`).
    pub async fn set(&self, key: &str, value: Value, ttl_secs: Option<u64>) {
        let ttl = ttl_secs
            .map(|s| Duration::seconds(s as i64))
            .unwrap_or(self.default_ttl);
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Utc::now() + ttl,
            },
        );
    }

    /// Returns the cached value, or runs `producer` exactly once, stores its
    /// result, and returns it. The instance lock is held across the producer
    /// so concurrent misses on the same key serialize.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        key: &str,
        ttl_secs: Option<u64>,
        producer: F,
    ) -> Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        let mut entries = self.entries.lock().await;

        if let Some(entry) = entries.get(key) {
            if Utc::now() <= entry.expires_at {
                return Ok(entry.value.clone());
            }
            entries.remove(key);
        }

        let value = producer().await?;
        let ttl = ttl_secs
            .map(|s| Duration::seconds(s as i64))
            .unwrap_or(self.default_ttl);
        entries.insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                expires_at: Utc::now() + ttl,
            },
        );
        Ok(value)
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
