/// Bounded, sharded sentence-result cache.
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::request::SentenceResult;
use crate::WordId;

/// Rough in-memory footprint of one cached sentence (words, a soft-alignment
/// matrix around 20x20 floats, scores and the key), used to turn the
/// configured byte budget into a slot count.
const AVERAGE_ENTRY_SIZE_BYTES: usize = 2048;

/// Lock shards guarding the slot array; far fewer shards than slots.
const DEFAULT_MUTEX_BUCKETS: usize = 32;

/// Content address of a cached sentence: a hash over the owning model and the
/// segment tokens. The full key is stored alongside each record and compared
/// on fetch, so hash collisions degrade to misses, never to wrong results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheKey(u64);

impl CacheKey {
    pub fn new(model_id: u64, segment: &[WordId]) -> Self {
        let mut hasher = DefaultHasher::new();
        model_id.hash(&mut hasher);
        segment.hash(&mut hasher);
        Self(hasher.finish())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

struct Record {
    key: CacheKey,
    value: SentenceResult,
}

/// A fixed array of record slots with direct mapping and no probing: a store
/// replaces whatever occupied the slot, which amounts to a clock-like random
/// eviction with zero bookkeeping. Concurrency is sharded over a small mutex
/// array; slot `i` belongs to shard `i % M`. Capacity is fixed at
/// construction, there is no rehash.
pub struct TranslationCache {
    shards: Vec<Mutex<Vec<Option<Record>>>>,
    slots: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TranslationCache {
    /// Builds a cache sized for `size_in_bytes` of sentence results.
    pub fn new(size_in_bytes: usize) -> Self {
        Self::with_mutex_buckets(size_in_bytes, DEFAULT_MUTEX_BUCKETS)
    }

    pub fn with_mutex_buckets(size_in_bytes: usize, mutex_buckets: usize) -> Self {
        let slots = (size_in_bytes / AVERAGE_ENTRY_SIZE_BYTES).max(1);
        let buckets = mutex_buckets.clamp(1, slots);
        let shards = (0..buckets)
            .map(|shard| {
                // Slots congruent to `shard` modulo the bucket count.
                let len = (slots - shard + buckets - 1) / buckets;
                Mutex::new((0..len).map(|_| None).collect())
            })
            .collect();
        Self {
            shards,
            slots,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn locate(&self, key: CacheKey) -> (usize, usize) {
        let index = key.0 as usize % self.slots;
        (index % self.shards.len(), index / self.shards.len())
    }

    /// Copies out the record under `key`, if the slot holds exactly that key.
    pub fn fetch(&self, key: &CacheKey) -> Option<SentenceResult> {
        let (shard, offset) = self.locate(*key);
        let records = self.shards[shard].lock();
        match &records[offset] {
            Some(record) if record.key == *key => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(record.value.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn store(&self, key: CacheKey, value: SentenceResult) {
        let (shard, offset) = self.locate(key);
        let mut records = self.shards[shard].lock();
        records[offset] = Some(Record { key, value });
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn result_with_score(score: f32) -> SentenceResult {
        SentenceResult {
            words: vec![1, 2, 0],
            sentence_score: score,
            ..Default::default()
        }
    }

    #[test]
    fn fetch_returns_stored_value() {
        let cache = TranslationCache::new(1 << 20);
        let key = CacheKey::new(1, &[5, 6, 0]);
        assert_eq!(cache.fetch(&key), None);
        cache.store(key, result_with_score(-0.25));
        assert_eq!(cache.fetch(&key).unwrap().sentence_score, -0.25);
    }

    #[test]
    fn stats_account_every_fetch() {
        let cache = TranslationCache::new(1 << 20);
        let key = CacheKey::new(1, &[5, 0]);
        cache.fetch(&key);
        cache.store(key, result_with_score(0.0));
        cache.fetch(&key);
        cache.fetch(&CacheKey::new(1, &[6, 0]));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hits + stats.misses, 3);
    }

    #[test]
    fn colliding_store_replaces_the_slot() {
        // A single slot forces every key onto the same record.
        let cache = TranslationCache::with_mutex_buckets(1, 1);
        let first = CacheKey::new(1, &[1, 0]);
        let second = CacheKey::new(1, &[2, 0]);
        cache.store(first, result_with_score(-1.0));
        cache.store(second, result_with_score(-2.0));
        assert_eq!(cache.fetch(&first), None, "evicted by the collision");
        assert_eq!(cache.fetch(&second).unwrap().sentence_score, -2.0);
    }

    #[test]
    fn distinct_models_do_not_share_entries() {
        let cache = TranslationCache::new(1 << 20);
        let segment = [7, 8, 0];
        cache.store(CacheKey::new(1, &segment), result_with_score(-1.0));
        assert_eq!(cache.fetch(&CacheKey::new(2, &segment)), None);
    }

    #[test]
    fn concurrent_traffic_stays_consistent() {
        let cache = Arc::new(TranslationCache::new(1 << 18));
        let mut handles = Vec::new();
        for thread_id in 0..4u32 {
            let cache = cache.clone();
            handles.push(thread::spawn(move || {
                for i in 0..200u32 {
                    let key = CacheKey::new(u64::from(thread_id % 2), &[i, 0]);
                    cache.store(key, result_with_score(i as f32));
                    if let Some(value) = cache.fetch(&key) {
                        // A concurrent overwrite may interleave, but a hit
                        // must carry a value some thread actually stored.
                        assert_eq!(value.sentence_score.fract(), 0.0);
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        let stats = cache.stats();
        assert_eq!(stats.hits + stats.misses, 4 * 200);
    }
}
