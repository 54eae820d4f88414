use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::cache::keys::QueryKey;
use crate::cache::store::{QueryStorage, TruncatableStorage};

const DEFAULT_MAX_ENTRIES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeLimitOptions {
    /// Upper bound on the number of entries tracked by the wrapped policy.
    pub max_entries: usize,
    /// Coalesce truncations triggered within this window into one deferred
    /// truncation. While a truncation is pending the bound can be exceeded.
    pub throttle: Option<Duration>,
}

impl Default for SizeLimitOptions {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            throttle: None,
        }
    }
}

/// Bounds the entry count of a truncatable storage.
///
/// This decorator never picks victims itself: when a `set` leaves the wrapped
/// storage over the bound, it asks the wrapped policy to truncate the excess.
pub struct SizeLimit<S> {
    inner: Arc<S>,
    options: SizeLimitOptions,
    pending: Arc<AtomicBool>,
}

impl<S> SizeLimit<S>
where
    S: TruncatableStorage + 'static,
{
    pub fn new(inner: S, options: SizeLimitOptions) -> Self {
        Self {
            inner: Arc::new(inner),
            options,
            pending: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn max_entries(&self) -> usize {
        self.options.max_entries
    }

    fn enforce(&self) {
        if self.inner.len() <= self.options.max_entries {
            return;
        }

        let Some(window) = self.options.throttle else {
            truncate_excess(self.inner.as_ref(), self.options.max_entries);
            return;
        };

        if self.pending.swap(true, Ordering::AcqRel) {
            return;
        }

        let Ok(runtime) = Handle::try_current() else {
            warn!(
                max_entries = self.options.max_entries,
                "No async runtime for throttled truncation; truncating immediately"
            );
            truncate_excess(self.inner.as_ref(), self.options.max_entries);
            self.pending.store(false, Ordering::Release);
            return;
        };

        let inner = Arc::clone(&self.inner);
        let pending = Arc::clone(&self.pending);
        let max_entries = self.options.max_entries;
        let deadline = tokio::time::Instant::now() + window;
        runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            truncate_excess(inner.as_ref(), max_entries);
            pending.store(false, Ordering::Release);
        });
    }
}

fn truncate_excess<S: TruncatableStorage + ?Sized>(storage: &S, max_entries: usize) {
    let len = storage.len();
    if len > max_entries {
        debug!(len, max_entries, "Size limit exceeded, truncating");
        storage.truncate(len - max_entries);
    }
}

impl<S> QueryStorage for SizeLimit<S>
where
    S: TruncatableStorage + 'static,
{
    fn has(&self, key: &QueryKey) -> bool {
        self.inner.has(key)
    }

    fn get(&self, key: &QueryKey) -> Option<Value> {
        self.inner.get(key)
    }

    fn set(&self, key: &QueryKey, value: Value) {
        self.inner.set(key, value);
        self.enforce();
    }

    fn clear(&self, key: &QueryKey) {
        self.inner.clear(key);
    }
}

impl<S> TruncatableStorage for SizeLimit<S>
where
    S: TruncatableStorage + 'static,
{
    fn truncate(&self, count: usize) {
        self.inner.truncate(count);
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::cache::policy::Lru;
    use crate::cache::policy::test_support::{RecordingStorage, key};

    fn limited(max_entries: usize, throttle: Option<Duration>) -> SizeLimit<Lru<RecordingStorage>> {
        SizeLimit::new(
            Lru::new(RecordingStorage::default()),
            SizeLimitOptions {
                max_entries,
                throttle,
            },
        )
    }

    #[test]
    fn never_exceeds_bound_without_throttle() {
        let storage = limited(2, None);

        for (index, name) in ["a", "b", "c", "d", "e"].into_iter().enumerate() {
            storage.set(&key(name), json!(index));
            assert!(storage.len() <= 2);
        }

        assert_eq!(storage.inner().inner().cleared(), vec!["a", "b", "c"]);
        assert!(storage.has(&key("d")));
        assert!(storage.has(&key("e")));
    }

    #[test]
    fn victims_follow_wrapped_policy() {
        let storage = limited(2, None);
        storage.set(&key("a"), json!(1));
        storage.set(&key("b"), json!(2));
        storage.get(&key("a"));
        storage.set(&key("c"), json!(3));

        assert_eq!(storage.inner().inner().cleared(), vec!["b"]);
    }

    #[test]
    fn overwriting_does_not_truncate() {
        let storage = limited(1, None);
        storage.set(&key("a"), json!(1));
        storage.set(&key("a"), json!(2));

        assert!(storage.inner().inner().cleared().is_empty());
        assert_eq!(storage.get(&key("a")), Some(json!(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_coalesces_truncations() {
        let window = Duration::from_millis(50);
        let storage = limited(1, Some(window));

        for name in ["a", "b", "c"] {
            storage.set(&key(name), json!(name));
        }
        assert_eq!(storage.len(), 3);

        tokio::time::sleep(window + Duration::from_millis(1)).await;

        assert_eq!(storage.len(), 1);
        assert_eq!(storage.inner().inner().cleared(), vec!["a", "b"]);
        assert!(storage.has(&key("c")));
    }

    #[test]
    fn throttle_without_runtime_truncates_inline() {
        let storage = limited(1, Some(Duration::from_millis(50)));
        storage.set(&key("a"), json!(1));
        storage.set(&key("b"), json!(2));

        assert_eq!(storage.len(), 1);
    }
}
