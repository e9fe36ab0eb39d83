//! Advisory result cache owned by the engine.
//!
//! Entries are keyed by a content hash of the operation, the input bit
//! patterns and the serialized options. A miss only costs a recomputation, so
//! entries may be evicted or expire at any time.

use configuration::CacheSettings;
use core_types::TimeSeries;
use dashmap::DashMap;
use serde::Serialize;
use std::any::Any;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    inserted: Instant,
    seq: u64,
}

/// Hit and miss counters, plus the current number of entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Capacity-bounded, TTL-limited concurrent result cache.
pub struct ResultCache {
    entries: DashMap<u64, Entry>,
    capacity: usize,
    ttl: Duration,
    seq: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("entries", &self.entries.len())
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl ResultCache {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: settings.capacity.max(1),
            ttl: settings.ttl,
            seq: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns a clone of the cached value when present, fresh, and of type `T`.
    pub fn get<T: Clone + 'static>(&self, key: u64) -> Option<T> {
        let found = self.entries.get(&key).and_then(|entry| {
            if entry.inserted.elapsed() <= self.ttl {
                entry.value.downcast_ref::<T>().cloned()
            } else {
                None
            }
        });
        match found {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(key, "result cache hit");
                Some(value)
            }
            None => {
                self.entries.remove_if(&key, |_, e| e.inserted.elapsed() > self.ttl);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores `value` under `key`, evicting the oldest entries beyond capacity.
    pub fn insert<T: Send + Sync + 'static>(&self, key: u64, value: T) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            key,
            Entry {
                value: Arc::new(value),
                inserted: Instant::now(),
                seq,
            },
        );
        while self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|e| e.value().seq)
                .map(|e| *e.key());
            match oldest {
                Some(k) => {
                    self.entries.remove(&k);
                    trace!(key = k, "evicted cached result");
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Incremental content hash for cache keys.
pub struct CacheKey {
    hasher: DefaultHasher,
}

impl CacheKey {
    pub fn new(operation: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        operation.hash(&mut hasher);
        Self { hasher }
    }

    pub fn values(mut self, values: &[f64]) -> Self {
        values.len().hash(&mut self.hasher);
        for v in values {
            v.to_bits().hash(&mut self.hasher);
        }
        self
    }

    pub fn series(mut self, series: &TimeSeries) -> Self {
        self = self.values(&series.values);
        match &series.timestamps {
            Some(ts) => {
                true.hash(&mut self.hasher);
                for t in ts {
                    t.timestamp_micros().hash(&mut self.hasher);
                }
            }
            None => false.hash(&mut self.hasher),
        }
        self
    }

    pub fn rows(mut self, rows: &[Vec<f64>]) -> Self {
        rows.len().hash(&mut self.hasher);
        for row in rows {
            self = self.values(row);
        }
        self
    }

    /// Mixes in the JSON form of `options`.
    pub fn options<T: Serialize>(mut self, options: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_string(options)?.hash(&mut self.hasher);
        Ok(self)
    }

    pub fn finish(self) -> u64 {
        self.hasher.finish()
    }
}
