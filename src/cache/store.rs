//! Storage contract and the default in-memory store.
//!
//! Every storage, including each eviction policy decorator, implements
//! [`QueryStorage`]. Operations are synchronous and never suspend, so a
//! decorator can finish its bookkeeping and the wrapped call as one step.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use super::keys::QueryKey;

/// Minimal key-value contract keyed by [`QueryKey`].
pub trait QueryStorage: Send + Sync {
    fn has(&self, key: &QueryKey) -> bool;

    /// Stored value, or `None` when `has` would be false.
    fn get(&self, key: &QueryKey) -> Option<Value>;

    /// Store `value`, replacing any previous value for the key.
    fn set(&self, key: &QueryKey, value: Value);

    /// Remove the entry. No-op when the key is absent.
    fn clear(&self, key: &QueryKey);
}

/// A storage whose entries can be removed in policy order.
pub trait TruncatableStorage: QueryStorage {
    /// Remove up to `count` entries chosen by the policy, clearing them from
    /// the wrapped storage too. `0` is a no-op; a count larger than [`len`]
    /// removes everything tracked.
    ///
    /// [`len`]: TruncatableStorage::len
    fn truncate(&self, count: usize);

    /// Number of entries the policy is tracking.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: QueryStorage + ?Sized> QueryStorage for Arc<S> {
    fn has(&self, key: &QueryKey) -> bool {
        (**self).has(key)
    }

    fn get(&self, key: &QueryKey) -> Option<Value> {
        (**self).get(key)
    }

    fn set(&self, key: &QueryKey, value: Value) {
        (**self).set(key, value)
    }

    fn clear(&self, key: &QueryKey) {
        (**self).clear(key)
    }
}

impl<S: TruncatableStorage + ?Sized> TruncatableStorage for Arc<S> {
    fn truncate(&self, count: usize) {
        (**self).truncate(count)
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}

impl<S: QueryStorage + ?Sized> QueryStorage for Box<S> {
    fn has(&self, key: &QueryKey) -> bool {
        (**self).has(key)
    }

    fn get(&self, key: &QueryKey) -> Option<Value> {
        (**self).get(key)
    }

    fn set(&self, key: &QueryKey, value: Value) {
        (**self).set(key, value)
    }

    fn clear(&self, key: &QueryKey) {
        (**self).clear(key)
    }
}

/// Default in-memory storage. Has no ordering or capacity logic of its own.
#[derive(Default)]
pub struct MemoryStorage {
    entries: DashMap<QueryKey, Value>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl QueryStorage for MemoryStorage {
    fn has(&self, key: &QueryKey) -> bool {
        self.entries.contains_key(key)
    }

    fn get(&self, key: &QueryKey) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn set(&self, key: &QueryKey, value: Value) {
        self.entries.insert(key.clone(), value);
    }

    fn clear(&self, key: &QueryKey) {
        self.entries.remove(key);
    }
}
