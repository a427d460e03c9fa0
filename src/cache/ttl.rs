use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

/// A map whose entries expire a fixed time after insertion.
///
/// Shard guards are only held for map access, never while a value is
/// fetched, so concurrent misses for the same key may fetch twice; the last
/// insert wins.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: DashMap<K, (V, Instant)>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty cache.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Entry lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached value if it has not expired.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries
            .get(key)
            .filter(|entry| entry.1.elapsed() < self.ttl)
            .map(|entry| entry.0.clone())
    }

    /// Store a value, restarting its lifetime.
    pub fn insert(&self, key: K, value: V) {
        let now = Instant::now();
        self.entries
            .retain(|_, (_, inserted)| now.duration_since(*inserted) < self.ttl);
        self.entries.insert(key, (value, now));
    }

    /// Number of stored entries, expired ones included until the next insert.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the fresh value for `key`, or run `fetch` and cache its result.
    /// Errors are returned to the caller and not cached.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: &K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = fetch().await?;
        self.insert(key.clone(), value.clone());
        Ok(value)
    }
}
