//! Bounded query cache with insertion-order (FIFO) eviction.
//!
//! Both the embedding cache and the result cache are instances of
//! [`BoundedCache`]. Reads do not refresh an entry's position: once full,
//! the entry inserted earliest is the one evicted, however often it was hit.
//!
//! Every operation takes the lock for a short critical section only. Values
//! are computed outside the lock, so two concurrent misses on the same key
//! may both compute; the last insert wins.

use std::collections::VecDeque;
use std::future::Future;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::{Result, RetrievalError};

pub const DEFAULT_CAPACITY: usize = 100;

struct Entries<V> {
    values: FxHashMap<String, V>,
    order: VecDeque<String>,
}

pub struct BoundedCache<V> {
    capacity: usize,
    entries: Mutex<Entries<V>>,
}

impl<V: Clone> BoundedCache<V> {
    /// Creates an empty cache holding at most `capacity` entries.
    ///
    /// A zero capacity is a configuration error.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(RetrievalError::InvalidCacheCapacity { capacity });
        }

        Ok(BoundedCache {
            capacity,
            entries: Mutex::new(Entries {
                values: FxHashMap::default(),
                order: VecDeque::with_capacity(capacity),
            }),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.lock().values.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores `value` under `key` and returns it.
    ///
    /// Overwriting an existing key keeps its original insertion position.
    /// Inserting a new key into a full cache evicts exactly one entry, the
    /// earliest inserted.
    pub fn insert(&self, key: &str, value: V) -> V {
        let mut entries = self.entries.lock();

        if let Some(slot) = entries.values.get_mut(key) {
            *slot = value.clone();
            return value;
        }

        if entries.values.len() >= self.capacity() {
            if let Some(oldest) = entries.order.pop_front() {
                entries.values.remove(&oldest);
                tracing::debug!(evicted = %oldest, capacity = self.capacity(), "cache full, evicted oldest entry");
            }
        }

        entries.order.push_back(key.to_string());
        entries.values.insert(key.to_string(), value.clone());
        value
    }

    /// Returns the cached value for `key`, computing and storing it on a miss.
    ///
    /// A failing `compute` leaves the cache untouched.
    pub fn get_or_insert<E>(
        &self,
        key: &str,
        compute: impl FnOnce() -> std::result::Result<V, E>,
    ) -> std::result::Result<V, E> {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = compute()?;
        Ok(self.insert(key, value))
    }

    /// Async form of [`get_or_insert`](Self::get_or_insert). The lock is not
    /// held while `compute` is awaited.
    pub async fn get_or_try_insert_with<E, F, Fut>(
        &self,
        key: &str,
        compute: F,
    ) -> std::result::Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = compute().await?;
        Ok(self.insert(key, value))
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.values.clear();
        entries.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn zero_capacity_is_rejected() {
        let err = BoundedCache::<u32>::new(0).err();
        assert_eq!(err, Some(RetrievalError::InvalidCacheCapacity { capacity: 0 }));
    }

    #[test]
    fn reports_configured_capacity() {
        let cache = BoundedCache::<u32>::new(3).unwrap();
        assert_eq!(cache.capacity(), 3);
        assert!(cache.is_empty());
    }

    #[test]
    fn evicts_earliest_inserted_key() {
        let cache = BoundedCache::new(3).unwrap();
        for key in ["a", "b", "c"] {
            cache.insert(key, key.len());
        }
        // Hits do not protect "a": eviction is by insertion, not access.
        assert!(cache.get("a").is_some());
        cache.insert("d", 1);

        assert_eq!(cache.len(), 3);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
        assert!(cache.get("d").is_some());
    }

    #[test]
    fn overwrite_keeps_position() {
        let cache = BoundedCache::new(2).unwrap();
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 3);
        assert_eq!(cache.get("a"), Some(3));
        cache.insert("c", 4);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn get_or_insert_computes_once() {
        let cache = BoundedCache::new(4).unwrap();
        let calls = AtomicUsize::new(0);
        let compute = || -> std::result::Result<u32, ()> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        };

        assert_eq!(cache.get_or_insert("q", compute), Ok(7));
        assert_eq!(cache.get_or_insert("q", compute), Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_compute_caches_nothing() {
        let cache = BoundedCache::<u32>::new(4).unwrap();
        let result = cache.get_or_insert("q", || Err("provider down"));
        assert_eq!(result, Err("provider down"));
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_removes_everything() {
        let cache = BoundedCache::new(4).unwrap();
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.clear();
        assert!(cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn async_compute_runs_on_miss_only() {
        let cache = BoundedCache::new(2).unwrap();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_try_insert_with("q", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(vec![1.0, 2.0])
                })
                .await
                .unwrap();
            assert_eq!(value, vec![1.0, 2.0]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_respect_capacity() {
        let cache = Arc::new(BoundedCache::new(8).unwrap());
        let mut handles = Vec::new();
        for i in 0..64 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_try_insert_with(&format!("q{}", i % 20), || async move {
                        tokio::task::yield_now().await;
                        Ok::<_, ()>(i)
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(cache.len(), 8);
    }

    proptest! {
        #[test]
        fn size_never_exceeds_capacity(
            capacity in 1usize..10,
            keys in prop::collection::vec("[a-f]{1,2}", 0..60),
        ) {
            let cache = BoundedCache::new(capacity).unwrap();
            for key in &keys {
                cache.insert(key, ());
                prop_assert!(cache.len() <= capacity);
            }
        }

        #[test]
        fn overflow_by_one_evicts_first_key(capacity in 1usize..20) {
            let cache = BoundedCache::new(capacity).unwrap();
            for i in 0..=capacity {
                cache.insert(&format!("k{i}"), i);
            }
            prop_assert!(cache.get("k0").is_none());
            for i in 1..=capacity {
                let key = format!("k{}", i);
                prop_assert!(cache.get(&key).is_some());
            }
            prop_assert_eq!(cache.len(), capacity);
        }
    }
}
