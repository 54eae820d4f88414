use std::sync::Mutex;

use serde_json::Value;

use super::{KeyOrder, evict};
use crate::cache::keys::QueryKey;
use crate::cache::lock::mutex_lock;
use crate::cache::store::{QueryStorage, TruncatableStorage};

const SOURCE: &str = "cache::policy::mru";

/// Most-recently-used eviction: same bookkeeping as [`Lru`], opposite victim.
///
/// [`Lru`]: super::Lru
pub struct Mru<S> {
    inner: S,
    order: Mutex<KeyOrder>,
}

impl<S: QueryStorage> Mru<S> {
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

impl<S: QueryStorage> QueryStorage for Mru<S> {
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

impl<S: QueryStorage> TruncatableStorage for Mru<S> {
    fn truncate(&self, count: usize) {
        let mut order = mutex_lock(&self.order, SOURCE, "truncate");
        evict("mru", &self.inner, count, || order.pop_newest());
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
    fn evicts_most_recently_used() {
        let mru = Mru::new(RecordingStorage::default());
        for name in ["a", "b", "c"] {
            mru.set(&key(name), json!(name));
        }
        for name in ["a", "b", "c", "b"] {
            mru.get(&key(name));
        }

        mru.truncate(2);

        assert_eq!(mru.inner().cleared(), vec!["b", "c"]);
        assert!(mru.has(&key("a")));
    }

    #[test]
    fn newest_insert_goes_first_without_reads() {
        let mru = Mru::new(RecordingStorage::default());
        mru.set(&key("a"), json!(1));
        mru.set(&key("b"), json!(2));

        mru.truncate(1);

        assert_eq!(mru.inner().cleared(), vec!["b"]);
        assert_eq!(mru.len(), 1);
    }
}
