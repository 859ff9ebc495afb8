// src/matching/cache.rs - Sharded LRU memo of (cleaned input, catalog version) -> match
use log::{debug, info, warn};
use lru::LruCache;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::matching::matcher::CandidateMatch;
use crate::utils::config::MatchingConfig;
use crate::utils::constants::{CACHE_STATS_LOG_INTERVAL, DEFAULT_CACHE_SHARDS, DEFAULT_CACHE_SIZE};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    cleaned_input: String,
    catalog_version: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    /// Entries found under the right key but computed for another catalog version.
    pub stale: usize,
    pub entries: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn lookups(&self) -> usize {
        self.hits + self.misses
    }

    pub fn hit_rate(&self) -> f64 {
        if self.lookups() == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups() as f64 * 100.0
        }
    }

    /// Counter difference between two snapshots of the same cache.
    pub fn since(&self, earlier: &CacheStats) -> CacheStats {
        CacheStats {
            hits: self.hits.saturating_sub(earlier.hits),
            misses: self.misses.saturating_sub(earlier.misses),
            stale: self.stale.saturating_sub(earlier.stale),
            entries: self.entries,
            capacity: self.capacity,
        }
    }
}

/// Memoizes matcher output per cleaned text and catalog version.
///
/// Keys are spread over independently locked LRU shards. A lookup holds its
/// shard's lock from the check through the compute to the write, so a key is
/// computed at most once while other shards carry on.
pub struct MatchCache {
    shards: Vec<Mutex<LruCache<CacheKey, CandidateMatch>>>,
    capacity: usize,
    hits: AtomicUsize,
    misses: AtomicUsize,
    stale: AtomicUsize,
}

impl Default for MatchCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE, DEFAULT_CACHE_SHARDS)
    }
}

impl MatchCache {
    pub fn new(capacity: usize, shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        let per_shard = NonZeroUsize::new(capacity.div_ceil(shard_count)).unwrap_or(NonZeroUsize::MIN);

        info!(
            "Initializing MatchCache with capacity {} across {} shards",
            per_shard.get() * shard_count,
            shard_count
        );

        Self {
            shards: (0..shard_count).map(|_| Mutex::new(LruCache::new(per_shard))).collect(),
            capacity: per_shard.get() * shard_count,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            stale: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &MatchingConfig) -> Self {
        Self::new(config.cache_size, config.cache_shards)
    }

    fn shard_for(&self, key: &CacheKey) -> &Mutex<LruCache<CacheKey, CandidateMatch>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Returns the cached match for the key or computes and stores it.
    /// `compute` runs under the shard lock and must not touch this cache.
    pub fn get_or_compute<F>(&self, cleaned_input: &str, catalog_version: u64, compute: F) -> CandidateMatch
    where
        F: FnOnce() -> CandidateMatch,
    {
        let key = CacheKey {
            cleaned_input: cleaned_input.to_string(),
            catalog_version,
        };
        // A panic inside `compute` poisons the shard; the LRU itself is still
        // consistent because the write happens after the compute.
        let mut shard = self.shard_for(&key).lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(cached) = shard.get(&key) {
            if cached.catalog_version == catalog_version {
                let result = cached.clone();
                drop(shard);
                self.record_hit();
                return result;
            }
            warn!(
                "Cached match for '{}' carries catalog v{} under key v{}, recomputing",
                cleaned_input, cached.catalog_version, catalog_version
            );
            self.stale.fetch_add(1, Ordering::Relaxed);
        }

        self.record_miss();
        let computed = compute();
        shard.put(key, computed.clone());
        computed
    }

    /// Skips the read and overwrites the entry. Used when a single row is
    /// reprocessed on request.
    pub fn recompute_and_store<F>(&self, cleaned_input: &str, catalog_version: u64, compute: F) -> CandidateMatch
    where
        F: FnOnce() -> CandidateMatch,
    {
        let key = CacheKey {
            cleaned_input: cleaned_input.to_string(),
            catalog_version,
        };
        let mut shard = self.shard_for(&key).lock().unwrap_or_else(PoisonError::into_inner);
        let computed = compute();
        shard.put(key, computed.clone());
        debug!("Refreshed cached match for '{}' (catalog v{})", cleaned_input, catalog_version);
        computed
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.maybe_log_stats();
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.maybe_log_stats();
    }

    fn maybe_log_stats(&self) {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        if (hits + misses) % CACHE_STATS_LOG_INTERVAL == 0 {
            info!(
                "MatchCache stats - hits: {}, misses: {}, hit rate: {:.2}%",
                hits,
                misses,
                hits as f64 / (hits + misses) as f64 * 100.0
            );
        }
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            entries: self.len(),
            capacity: self.capacity,
        }
    }

    pub fn clear(&self) {
        for shard in &self.shards {
            shard.lock().unwrap_or_else(PoisonError::into_inner).clear();
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.stale.store(0, Ordering::Relaxed);
        info!("Match cache cleared");
    }
}

/// A cache shared by every task of a pipeline.
pub type SharedMatchCache = Arc<MatchCache>;
