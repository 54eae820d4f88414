use std::sync::Mutex;

use serde_json::Value;

use super::{KeyOrder, evict};
use crate::cache::keys::QueryKey;
use crate::cache::lock::mutex_lock;
use crate::cache::store::{QueryStorage, TruncatableStorage};

const SOURCE: &str = "cache::policy::lru";

/// Least-recently-used eviction.
///
/// `get` moves a tracked key to the most recent end; truncation removes from
/// the least recent end. Re-storing a tracked key does not count as an access.
pub struct Lru<S> {
    inner: S,
    order: Mutex<KeyOrder>,
}

impl<S: QueryStorage> Lru<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            order: Mutex::new(KeyOrder::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: QueryStorage> QueryStorage for Lru<S> {
    fn has(&self, key: &QueryKey) -> bool {
        self.inner.has(key)
    }

    fn get(&self, key: &QueryKey) -> Option<Value> {
        let mut order = mutex_lock(&self.order, SOURCE, "get");
        order.touch(key);
        self.inner.get(key)
    }

    fn set(&self, key: &QueryKey, value: Value) {
        let mut order = mutex_lock(&self.order, SOURCE, "set");
        order.insert(key);
        self.inner.set(key, value);
    }

    fn clear(&self, key: &QueryKey) {
        let mut order = mutex_lock(&self.order, SOURCE, "clear");
        order.remove(key);
        self.inner.clear(key);
    }
}

impl<S: QueryStorage> TruncatableStorage for Lru<S> {
    fn truncate(&self, count: usize) {
        let mut order = mutex_lock(&self.order, SOURCE, "truncate");
        evict("lru", &self.inner, count, || order.pop_oldest());
    }

    fn len(&self) -> usize {
        mutex_lock(&self.order, SOURCE, "len").len()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::cache::policy::test_support::{RecordingStorage, key};

    #[test]
    fn evicts_least_recently_used() {
        let lru = Lru::new(RecordingStorage::default());
        for name in ["a", "b", "c"] {
            lru.set(&key(name), json!(name));
        }
        for name in ["a", "b", "c", "b"] {
            lru.get(&key(name));
        }

        lru.truncate(2);

        assert_eq!(lru.inner().cleared(), vec!["a", "c"]);
        assert!(lru.has(&key("b")));
    }

    #[test]
    fn reset_is_not_an_access() {
        let lru = Lru::new(RecordingStorage::default());
        lru.set(&key("a"), json!(1));
        lru.set(&key("b"), json!(2));
        lru.set(&key("a"), json!(3));

        lru.truncate(1);

        assert_eq!(lru.inner().cleared(), vec!["a"]);
    }

    #[test]
    fn get_of_unknown_key_is_harmless() {
        let lru = Lru::new(RecordingStorage::default());
        lru.set(&key("a"), json!(1));

        assert!(lru.get(&key("missing")).is_none());
        assert_eq!(lru.len(), 1);
    }
}
