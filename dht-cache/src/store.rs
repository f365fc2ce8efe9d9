//! Bounded map: an opaque LRU with TTL, keyed by the same `Id` the ring uses
//! for ownership. Wraps the real `lru` crate for recency tracking and adds
//! a byte-budget eviction loop and TTL expiry on top, since `lru::LruCache`
//! only bounds by entry count.

use dht_id::Id;
use lru::LruCache;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct StoredValue {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    inserted_at: Instant,
    ttl: Duration,
}

impl StoredValue {
    pub fn new(bytes: Vec<u8>, content_type: Option<String>, ttl: Duration) -> Self {
        Self {
            bytes,
            content_type,
            inserted_at: Instant::now(),
            ttl,
        }
    }

    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() > self.ttl
    }

    fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub entry_count: usize,
    pub size_bytes: usize,
    pub capacity_bytes: usize,
}

struct Inner {
    entries: LruCache<Id, StoredValue>,
    size_bytes: usize,
    hits: u64,
    misses: u64,
}

/// Thread-safe `get`/`put`/`delete`/`size`/`iterate`, as SPEC_FULL §4.7
/// restricts the core to treating this as a black box.
pub struct BoundedStore {
    inner: Mutex<Inner>,
    capacity_bytes: usize,
}

impl BoundedStore {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                size_bytes: 0,
                hits: 0,
                misses: 0,
            }),
            capacity_bytes,
        }
    }

    pub async fn get(&self, key: Id) -> Option<StoredValue> {
        let mut inner = self.inner.lock().await;
        match inner.entries.get(&key).cloned() {
            Some(value) if !value.is_expired() => {
                inner.hits += 1;
                Some(value)
            }
            Some(_) => {
                let removed = inner.entries.pop(&key);
                if let Some(v) = removed {
                    inner.size_bytes = inner.size_bytes.saturating_sub(v.size_bytes());
                }
                inner.misses += 1;
                None
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    pub async fn put(&self, key: Id, value: StoredValue) {
        let mut inner = self.inner.lock().await;
        let new_size = value.size_bytes();
        if let Some(old) = inner.entries.put(key, value) {
            inner.size_bytes = inner.size_bytes.saturating_sub(old.size_bytes());
        }
        inner.size_bytes += new_size;
        while inner.size_bytes > self.capacity_bytes {
            match inner.entries.pop_lru() {
                Some((_, evicted)) => inner.size_bytes = inner.size_bytes.saturating_sub(evicted.size_bytes()),
                None => break,
            }
        }
    }

    pub async fn delete(&self, key: Id) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.entries.pop(&key) {
            Some(v) => {
                inner.size_bytes = inner.size_bytes.saturating_sub(v.size_bytes());
                true
            }
            None => false,
        }
    }

    pub async fn keys(&self) -> Vec<Id> {
        let inner = self.inner.lock().await;
        inner.entries.iter().map(|(k, _)| *k).collect()
    }

    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().await;
        let total = inner.hits + inner.misses;
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            hit_rate: if total == 0 { 0.0 } else { inner.hits as f64 / total as f64 },
            entry_count: inner.entries.len(),
            size_bytes: inner.size_bytes,
            capacity_bytes: self.capacity_bytes,
        }
    }
}
