use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde_json::Value;

use super::evict;
use crate::cache::keys::QueryKey;
use crate::cache::lock::mutex_lock;
use crate::cache::store::{QueryStorage, TruncatableStorage};

const SOURCE: &str = "cache::policy::lfu";

/// Frequency bookkeeping: `order` is sorted by non-decreasing count, and
/// `counts` is the arena the order refers into.
#[derive(Default)]
struct Frequencies {
    order: VecDeque<QueryKey>,
    counts: HashMap<QueryKey, u64>,
}

impl Frequencies {
    fn count(&self, key: &QueryKey) -> Option<u64> {
        self.counts.get(key).copied()
    }

    /// New keys start at count 1 at the head, ahead of older count-1 keys.
    fn insert(&mut self, key: &QueryKey) {
        if self.counts.contains_key(key) {
            return;
        }
        self.counts.insert(key.clone(), 1);
        self.order.push_front(key.clone());
    }

    /// Increment and move the key behind every entry with a count not above
    /// its new count, keeping the order sorted. Unknown keys are ignored.
    fn bump(&mut self, key: &QueryKey) {
        let Some(count) = self.counts.get_mut(key) else {
            return;
        };
        *count += 1;
        let count = *count;

        let Some(position) = self.order.iter().position(|tracked| tracked == key) else {
            return;
        };
        self.order.remove(position);

        let counts = &self.counts;
        let target = self
            .order
            .iter()
            .skip(position)
            .position(|tracked| counts.get(tracked).is_some_and(|&other| other > count))
            .map_or(self.order.len(), |offset| position + offset);
        self.order.insert(target, key.clone());
    }

    fn remove(&mut self, key: &QueryKey) {
        if self.counts.remove(key).is_some() {
            self.order.retain(|tracked| tracked != key);
        }
    }

    fn pop_least(&mut self) -> Option<QueryKey> {
        let key = self.order.pop_front()?;
        self.counts.remove(&key);
        Some(key)
    }
}

/// Least-frequently-used eviction.
///
/// Every `get` of a tracked key increments its count. Truncation removes the
/// keys with the smallest counts; among equal counts the head-most entry
/// goes first, which is the most recently inserted key for count 1 and the
/// earliest promoted key for higher counts.
pub struct Lfu<S> {
    inner: S,
    frequencies: Mutex<Frequencies>,
}

impl<S: QueryStorage> Lfu<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            frequencies: Mutex::new(Frequencies::default()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Current access count for a tracked key.
    ///
    /// The insert counts as the first access, so a key set once and then
    /// read three times reports 4, not 3.
    pub fn frequency(&self, key: &QueryKey) -> Option<u64> {
        mutex_lock(&self.frequencies, SOURCE, "frequency").count(key)
    }
}

impl<S: QueryStorage> QueryStorage for Lfu<S> {
    fn has(&self, key: &QueryKey) -> bool {
        self.inner.has(key)
    }

    fn get(&self, key: &QueryKey) -> Option<Value> {
        let mut frequencies = mutex_lock(&self.frequencies, SOURCE, "get");
        frequencies.bump(key);
        self.inner.get(key)
    }

    fn set(&self, key: &QueryKey, value: Value) {
        let mut frequencies = mutex_lock(&self.frequencies, SOURCE, "set");
        frequencies.insert(key);
        self.inner.set(key, value);
    }

    fn clear(&self, key: &QueryKey) {
        let mut frequencies = mutex_lock(&self.frequencies, SOURCE, "clear");
        frequencies.remove(key);
        self.inner.clear(key);
    }
}

impl<S: QueryStorage> TruncatableStorage for Lfu<S> {
    fn truncate(&self, count: usize) {
        let mut frequencies = mutex_lock(&self.frequencies, SOURCE, "truncate");
        evict("lfu", &self.inner, count, || frequencies.pop_least());
    }

    fn len(&self) -> usize {
        mutex_lock(&self.frequencies, SOURCE, "len").order.len()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::cache::policy::test_support::{RecordingStorage, key};

    fn seeded() -> Lfu<RecordingStorage> {
        let lfu = Lfu::new(RecordingStorage::default());
        for name in ["a", "b", "c"] {
            lfu.set(&key(name), json!(name));
        }
        lfu
    }

    #[test]
    fn evicts_least_frequent_first() {
        let lfu = seeded();
        for name in ["a", "b", "c", "a", "a", "b"] {
            lfu.get(&key(name));
        }

        assert_eq!(lfu.frequency(&key("a")), Some(4));
        assert_eq!(lfu.frequency(&key("b")), Some(3));
        assert_eq!(lfu.frequency(&key("c")), Some(2));

        lfu.truncate(2);

        assert_eq!(lfu.inner().cleared(), vec!["c", "b"]);
        assert!(lfu.has(&key("a")));
    }

    #[test]
    fn insert_counts_as_first_access() {
        let lfu = Lfu::new(RecordingStorage::default());
        lfu.set(&key("a"), json!(1));
        assert_eq!(lfu.frequency(&key("a")), Some(1));

        for _ in 0..3 {
            lfu.get(&key("a"));
        }
        assert_eq!(lfu.frequency(&key("a")), Some(4));
        assert_eq!(lfu.frequency(&key("missing")), None);
    }

    #[test]
    fn newest_untouched_key_goes_first_among_ties() {
        let lfu = seeded();

        lfu.truncate(1);

        assert_eq!(lfu.inner().cleared(), vec!["c"]);
    }

    #[test]
    fn earlier_promotion_goes_first_among_equal_counts() {
        let lfu = seeded();
        lfu.get(&key("b"));
        lfu.get(&key("a"));
        lfu.get(&key("c"));

        lfu.truncate(2);

        assert_eq!(lfu.inner().cleared(), vec!["b", "a"]);
    }

    #[test]
    fn get_of_unknown_key_is_noop() {
        let lfu = seeded();

        assert!(lfu.get(&key("missing")).is_none());
        assert_eq!(lfu.frequency(&key("missing")), None);
        assert_eq!(lfu.len(), 3);
    }

    #[test]
    fn reset_keeps_count() {
        let lfu = seeded();
        lfu.get(&key("a"));
        lfu.set(&key("a"), json!("again"));

        assert_eq!(lfu.frequency(&key("a")), Some(2));
        assert_eq!(lfu.get(&key("a")), Some(json!("again")));
    }

    #[test]
    fn clear_forgets_frequency() {
        let lfu = seeded();
        lfu.get(&key("b"));
        lfu.clear(&key("b"));

        assert_eq!(lfu.frequency(&key("b")), None);
        assert_eq!(lfu.len(), 2);
        assert!(!lfu.has(&key("b")));
    }
}
