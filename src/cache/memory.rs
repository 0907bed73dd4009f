//! In-process short-TTL cache for post-processed widget data
//!
//! Entries live in named buckets (one per widget type) and expire at an
//! absolute unix timestamp. Expired entries are dropped lazily on read and
//! in bulk by [`MemoryCache::sweep_expired`].

use chrono::Utc;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

use super::duration::expiry_timestamp;
use crate::error::CacheError;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: i64,
}

type Buckets<K, V> = HashMap<String, HashMap<K, Entry<V>>>;

/// Bucketed key/value cache with absolute expiry.
#[derive(Debug)]
pub struct MemoryCache<K, V> {
    buckets: Mutex<Buckets<K, V>>,
}

impl<K, V> Default for MemoryCache<K, V> {
    fn default() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> MemoryCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Buckets<K, V>> {
        // A panic while holding the lock leaves the map itself intact.
        self.buckets.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create an empty bucket if it does not exist yet.
    pub fn init_bucket(&self, bucket: &str) {
        self.lock().entry(bucket.to_string()).or_default();
    }

    /// Store `value` until `duration_code` from now.
    ///
    /// Returns `Ok(false)` and stores nothing when the code resolves to an
    /// expiry that is not in the future.
    pub fn set(&self, bucket: &str, key: K, value: V, duration_code: &str) -> Result<bool, CacheError> {
        self.set_at(bucket, key, value, duration_code, Utc::now().timestamp())
    }

    pub fn set_at(
        &self,
        bucket: &str,
        key: K,
        value: V,
        duration_code: &str,
        now: i64,
    ) -> Result<bool, CacheError> {
        let expires_at = expiry_timestamp(duration_code, now)?;
        if expires_at <= now {
            return Ok(false);
        }

        self.lock()
            .entry(bucket.to_string())
            .or_default()
            .insert(key, Entry { value, expires_at });
        Ok(true)
    }

    /// Fetch a live value. Reading an expired entry removes it.
    pub fn get(&self, bucket: &str, key: &K) -> Option<V> {
        self.get_at(bucket, key, Utc::now().timestamp())
    }

    pub fn get_at(&self, bucket: &str, key: &K, now: i64) -> Option<V> {
        let mut buckets = self.lock();
        let entries = buckets.get_mut(bucket)?;
        let expires_at = entries.get(key)?.expires_at;

        if expires_at <= now {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|entry| entry.value.clone())
    }

    /// Remove every entry whose expiry is at or before `now`.
    ///
    /// Returns the number of entries removed.
    pub fn sweep_expired(&self, now: i64) -> usize {
        let mut buckets = self.lock();
        let mut removed = 0;
        for entries in buckets.values_mut() {
            let before = entries.len();
            entries.retain(|_, entry| entry.expires_at > now);
            removed += before - entries.len();
        }
        removed
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.lock().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
