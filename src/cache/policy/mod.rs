//! Eviction policies as storage decorators.
//!
//! Each policy wraps a [`QueryStorage`] and is itself a
//! [`TruncatableStorage`], so policies stack by plain nesting:
//!
//! ```ignore
//! let storage = SizeLimit::new(
//!     Lru::new(Ttl::new(MemoryStorage::new(), TtlOptions::default())),
//!     SizeLimitOptions { max_entries: 100, throttle: None },
//! );
//! ```
//!
//! A policy only talks to the storage it wraps through the storage contract
//! and owns its order bookkeeping exclusively. Bookkeeping and the wrapped
//! call happen under the policy's lock, and locks are only ever taken from
//! the outermost decorator inwards.
//!
//! [`QueryStorage`]: super::store::QueryStorage
//! [`TruncatableStorage`]: super::store::TruncatableStorage

mod fifo;
mod lfu;
mod lru;
mod mru;
mod sized;
mod ttl;

pub use fifo::Fifo;
pub use lfu::Lfu;
pub use lru::Lru;
pub use mru::Mru;
pub use sized::{SizeLimit, SizeLimitOptions};
pub use ttl::{Ttl, TtlOptions};

use ::lru::LruCache;
use metrics::counter;
use tracing::debug;

use super::keys::QueryKey;
use super::store::QueryStorage;

pub(crate) const METRIC_EVICT_TOTAL: &str = "querycache_evict_total";

pub(crate) fn record_evictions(policy: &'static str, count: usize) {
    if count == 0 {
        return;
    }
    counter!(METRIC_EVICT_TOTAL, "policy" => policy).increment(count as u64);
    debug!(policy, count, "Evicted cache entries");
}

/// Clears up to `count` keys handed out by `next_victim` from `inner`.
pub(crate) fn evict<S, F>(policy: &'static str, inner: &S, count: usize, mut next_victim: F)
where
    S: QueryStorage + ?Sized,
    F: FnMut() -> Option<QueryKey>,
{
    let mut evicted = 0;
    while evicted < count {
        let Some(key) = next_victim() else {
            break;
        };
        inner.clear(&key);
        evicted += 1;
    }
    record_evictions(policy, evicted);
}

/// Recency-ordered key set shared by the FIFO, LRU and MRU policies.
///
/// The oldest key sits at the "lru" end of the underlying list and the newest
/// at the "mru" end. Nothing here moves a key unless asked to.
pub(crate) struct KeyOrder {
    keys: LruCache<QueryKey, ()>,
}

impl KeyOrder {
    pub(crate) fn new() -> Self {
        Self {
            keys: LruCache::unbounded(),
        }
    }

    /// Append `key` at the newest end unless it is already tracked.
    pub(crate) fn insert(&mut self, key: &QueryKey) {
        if !self.keys.contains(key) {
            self.keys.put(key.clone(), ());
        }
    }

    /// Move a tracked key to the newest end. Unknown keys are ignored.
    pub(crate) fn touch(&mut self, key: &QueryKey) {
        self.keys.promote(key);
    }

    pub(crate) fn remove(&mut self, key: &QueryKey) {
        self.keys.pop(key);
    }

    pub(crate) fn pop_oldest(&mut self) -> Option<QueryKey> {
        self.keys.pop_lru().map(|(key, ())| key)
    }

    pub(crate) fn pop_newest(&mut self) -> Option<QueryKey> {
        self.keys.pop_mru().map(|(key, ())| key)
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;

    use serde_json::{Value, json};

    use crate::cache::keys::QueryKey;
    use crate::cache::store::{MemoryStorage, QueryStorage};

    pub(crate) fn key(name: &str) -> QueryKey {
        QueryKey::new(name, vec![json!({ "id": name })]).expect("key should build")
    }

    /// Memory storage that records every `clear` it receives.
    #[derive(Default)]
    pub(crate) struct RecordingStorage {
        inner: MemoryStorage,
        cleared: Mutex<Vec<String>>,
    }

    impl RecordingStorage {
        pub(crate) fn cleared(&self) -> Vec<String> {
            self.cleared.lock().expect("recording lock").clone()
        }
    }

    impl QueryStorage for RecordingStorage {
        fn has(&self, key: &QueryKey) -> bool {
            self.inner.has(key)
        }

        fn get(&self, key: &QueryKey) -> Option<Value> {
            self.inner.get(key)
        }

        fn set(&self, key: &QueryKey, value: Value) {
            self.inner.set(key, value)
        }

        fn clear(&self, key: &QueryKey) {
            self.cleared
                .lock()
                .expect("recording lock")
                .push(key.name().to_string());
            self.inner.clear(key)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::test_support::{RecordingStorage, key};
    use super::*;

    #[test]
    fn key_order_keeps_first_insert_position() {
        let mut order = KeyOrder::new();
        order.insert(&key("a"));
        order.insert(&key("b"));
        order.insert(&key("a"));

        assert_eq!(order.len(), 2);
        assert_eq!(order.pop_oldest(), Some(key("a")));
        assert_eq!(order.pop_newest(), Some(key("b")));
        assert_eq!(order.pop_oldest(), None);
    }

    #[test]
    fn touch_moves_key_to_newest_end() {
        let mut order = KeyOrder::new();
        order.insert(&key("a"));
        order.insert(&key("b"));
        order.touch(&key("a"));
        order.touch(&key("unknown"));

        assert_eq!(order.pop_newest(), Some(key("a")));
        assert_eq!(order.len(), 1);
    }

    #[test]
    fn evict_stops_when_victims_run_out() {
        let storage = RecordingStorage::default();
        let mut victims = vec![key("b"), key("a")];
        for name in ["a", "b"] {
            storage.set(&key(name), json!(name));
        }

        evict("fifo", &storage, 5, || victims.pop());

        assert_eq!(storage.cleared(), vec!["a", "b"]);
        assert!(victims.is_empty());
    }

    #[test]
    fn evict_honours_the_requested_count() {
        let storage = RecordingStorage::default();
        let mut victims = vec![key("c"), key("b"), key("a")];

        evict("lru", &storage, 2, || victims.pop());

        assert_eq!(storage.cleared(), vec!["a", "b"]);
        assert_eq!(victims, vec![key("c")]);
    }
}
