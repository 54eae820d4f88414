use std::sync::Mutex;

use serde_json::Value;

use super::{KeyOrder, evict};
use crate::cache::keys::QueryKey;
use crate::cache::lock::mutex_lock;
use crate::cache::store::{QueryStorage, TruncatableStorage};

const SOURCE: &str = "cache::policy::fifo";

/// First-in, first-out eviction.
///
/// Truncation removes the keys that were first stored earliest. Storing an
/// already tracked key again keeps its original position.
pub struct Fifo<S> {
    inner: S,
    order: Mutex<KeyOrder>,
}

impl<S: QueryStorage> Fifo<S> {
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

impl<S: QueryStorage> QueryStorage for Fifo<S> {
    fn has(&self, key: &QueryKey) -> bool {
        self.inner.has(key)
    }

    fn get(&self, key: &QueryKey) -> Option<Value> {
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

impl<S: QueryStorage> TruncatableStorage for Fifo<S> {
    fn truncate(&self, count: usize) {
        let mut order = mutex_lock(&self.order, SOURCE, "truncate");
        evict("fifo", &self.inner, count, || order.pop_oldest());
    }

    fn len(&self) -> usize {
        mutex_lock(&self.order, SOURCE, "len").len()
    }
}
