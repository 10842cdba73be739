//! FILENAME: pivot-engine/src/result_cache.rs
//! Result Cache - bounded LRU of finished pivot results.
//!
//! Keys fingerprint the definition (id, version, closure-free snapshot) and
//! the extracted values of every configured field over the filtered records.
//! Closures cannot be hashed: callers bump `PivotDefinition::version` when
//! they swap one.

use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;
use lru::LruCache;
use parking_lot::Mutex;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

use crate::cache::SourceCache;
use crate::definition::PivotDefinition;
use crate::view::PivotResult;

fn default_cache_capacity() -> usize {
    64
}

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Maximum number of cached results.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Entries older than this are treated as misses. `None` keeps them
    /// until evicted.
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: None,
        }
    }
}

/// Cache statistics for monitoring performance.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
}

impl CacheStats {
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of `CacheStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStatsSnapshot {
    /// Hit rate as a fraction (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheEntry {
    result: Arc<PivotResult>,
    inserted: Instant,
}

/// Thread-safe LRU of results keyed by `cache_key`.
pub struct ResultCache {
    entries: Mutex<LruCache<u64, CacheEntry>>,
    ttl: Option<Duration>,
    stats: CacheStats,
}

impl ResultCache {
    pub fn new(options: &EngineOptions) -> Self {
        ResultCache {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(options.cache_capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl: options.cache_ttl_secs.map(Duration::from_secs),
            stats: CacheStats::default(),
        }
    }

    pub fn get(&self, key: u64) -> Option<Arc<PivotResult>> {
        let mut entries = self.entries.lock();

        let expired = match entries.get(&key) {
            Some(entry) => self.ttl.is_some_and(|ttl| entry.inserted.elapsed() > ttl),
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if expired {
            entries.pop(&key);
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            debug!("cache entry {:016x} expired", key);
            return None;
        }

        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        entries.get(&key).map(|entry| Arc::clone(&entry.result))
    }

    pub fn insert(&self, key: u64, result: Arc<PivotResult>) {
        let mut entries = self.entries.lock();
        // Only count eviction if the cache is full AND the key is new
        if entries.len() == entries.cap().get() && !entries.contains(&key) {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
        entries.put(
            key,
            CacheEntry {
                result,
                inserted: Instant::now(),
            },
        );
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}

/// Fingerprint of a definition applied to a filtered record set.
/// `None` when the snapshot cannot be serialized; the run is then uncached.
pub fn cache_key<R>(definition: &PivotDefinition<R>, source: &SourceCache<'_, R>) -> Option<u64> {
    let snapshot = serde_json::to_vec(&definition.snapshot()).ok()?;
    let mut hasher = FxHasher::default();
    definition.id.hash(&mut hasher);
    definition.version.hash(&mut hasher);
    snapshot.hash(&mut hasher);
    source.content_hash(definition).hash(&mut hasher);
    Some(hasher.finish())
}
