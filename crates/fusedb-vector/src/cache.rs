//! In-memory cache of query embeddings.
//!
//! Keys are the blake3 digest of the exact query text, so `"Water"` and
//! `"water "` are different entries. Entries expire `ttl` after they were
//! written; reads do not extend their lifetime. When the cache is full a write
//! first drops expired entries and then, if still full, evicts the least
//! recently used one.
//!
//! Hit and request counters are advanced by the caller through
//! [`EmbeddingCache::record_request`] and [`EmbeddingCache::record_hit`], so a
//! lookup that is retried internally is still counted once.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::Serialize;
use tracing::debug;

use fusedb_core::config::CacheSettings;

type CacheKey = [u8; 32];

/// A cached query vector.
#[derive(Debug, Clone)]
struct CacheEntry {
    vector: Vec<f32>,
    /// Expiry is measured from here
    created_at: Instant,
    last_accessed_at: Instant,
}

/// Snapshot of cache occupancy and counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub ttl_secs: u64,
    pub hit_count: u64,
    pub request_count: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.request_count == 0 {
            0.0
        } else {
            self.hit_count as f64 / self.request_count as f64
        }
    }
}

/// Thread-safe TTL + LRU cache from query text to embedding.
pub struct EmbeddingCache {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
    capacity: NonZeroUsize,
    ttl: Duration,
    hits: AtomicU64,
    requests: AtomicU64,
}

impl EmbeddingCache {
    /// A zero `max_size` is treated as 1.
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            capacity,
            ttl,
            hits: AtomicU64::new(0),
            requests: AtomicU64::new(0),
        }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self { Self::new(settings.max_size, settings.ttl()) }

    pub fn get(&self, text: &str) -> Option<Vec<f32>> { self.get_at(text, Instant::now()) }

    pub fn put(&self, text: &str, vector: Vec<f32>) { self.put_at(text, vector, Instant::now()) }

    /// Look up `text` as of `now`. An expired entry is removed and reported as a miss.
    pub fn get_at(&self, text: &str, now: Instant) -> Option<Vec<f32>> {
        let key = cache_key(text);
        let mut entries = self.lock();
        let expired = self.is_expired(entries.peek(&key)?, now);
        if expired {
            entries.pop(&key);
            debug!("embedding cache entry expired");
            return None;
        }
        let entry = entries.get_mut(&key)?;
        entry.last_accessed_at = now;
        Some(entry.vector.clone())
    }

    /// Store `vector` for `text` as of `now`. Overwriting an existing key
    /// resets its age and never evicts.
    pub fn put_at(&self, text: &str, vector: Vec<f32>, now: Instant) {
        let key = cache_key(text);
        let mut entries = self.lock();
        if !entries.contains(&key) && entries.len() >= self.capacity.get() {
            let stale: Vec<CacheKey> = entries.iter().filter(|(_, e)| self.is_expired(e, now)).map(|(k, _)| *k).collect();
            for k in &stale {
                entries.pop(k);
            }
            if !stale.is_empty() {
                debug!(purged = stale.len(), "purged expired embedding cache entries");
            }
        }
        let entry = CacheEntry { vector, created_at: now, last_accessed_at: now };
        if let Some((evicted, _)) = entries.push(key, entry) {
            if evicted != key {
                debug!(capacity = self.capacity.get(), "evicted least recently used embedding");
            }
        }
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) { self.lock().clear(); }

    pub fn len(&self) -> usize { self.lock().len() }

    pub fn is_empty(&self) -> bool { self.lock().is_empty() }

    pub fn record_request(&self) { self.requests.fetch_add(1, Ordering::Relaxed); }

    pub fn record_hit(&self) { self.hits.fetch_add(1, Ordering::Relaxed); }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.len(),
            capacity: self.capacity.get(),
            ttl_secs: self.ttl.as_secs(),
            hit_count: self.hits.load(Ordering::Relaxed),
            request_count: self.requests.load(Ordering::Relaxed),
        }
    }

    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool { now.saturating_duration_since(entry.created_at) > self.ttl }

    fn lock(&self) -> MutexGuard<'_, LruCache<CacheKey, CacheEntry>> { self.entries.lock().unwrap_or_else(PoisonError::into_inner) }
}

fn cache_key(text: &str) -> CacheKey { *blake3::hash(text.as_bytes()).as_bytes() }
