//! LRU cache for encoded query vectors.
//!
//! Repeated searches with the same text or document skip the encoder.
//! Keys are the modality plus a SHA-256 of the encoder input; all cache
//! operations are non-blocking (try-lock) so a contended cache degrades
//! to a miss instead of stalling a query.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use crate::search::content_hash;
use crate::search::embeddings::Modality;

/// Default number of cached query vectors
pub const DEFAULT_QUERY_CACHE_SIZE: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct QueryKey {
    modality: Modality,
    input_hash: String,
}

impl QueryKey {
    fn new(modality: Modality, input: &str) -> Self {
        Self {
            modality,
            input_hash: content_hash(input),
        }
    }
}

/// Cache statistics for monitoring and tuning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Thread-safe LRU of modality vectors
pub struct QueryCache {
    entries: Mutex<LruCache<QueryKey, Vec<f32>>>,
    stats: Mutex<CacheStats>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_CACHE_SIZE)
    }
}

impl QueryCache {
    /// A capacity of zero is bumped to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Returns None if not cached or the cache is locked.
    pub fn get(&self, modality: Modality, input: &str) -> Option<Vec<f32>> {
        let key = QueryKey::new(modality, input);
        let mut cache = self.entries.try_lock()?;
        let hit = cache.get(&key).cloned();
        if let Some(mut stats) = self.stats.try_lock() {
            if hit.is_some() {
                stats.hits += 1;
            } else {
                stats.misses += 1;
            }
        }
        hit
    }

    /// Silently skipped if the cache is locked.
    pub fn put(&self, modality: Modality, input: &str, vector: Vec<f32>) {
        let key = QueryKey::new(modality, input);
        if let Some(mut cache) = self.entries.try_lock() {
            cache.put(key, vector);
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.try_lock().map(|s| *s).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.try_lock().map_or(0, |c| c.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Some(mut cache) = self.entries.try_lock() {
            cache.clear();
        }
        if let Some(mut stats) = self.stats.try_lock() {
            *stats = CacheStats::default();
        }
    }
}
