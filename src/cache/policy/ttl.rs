use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::debug;

use super::record_evictions;
use crate::cache::keys::QueryKey;
use crate::cache::lock::mutex_lock;
use crate::cache::store::{QueryStorage, TruncatableStorage};

const SOURCE: &str = "cache::policy::ttl";
const DEFAULT_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlOptions {
    pub ttl: Duration,
    /// Restart the expiry window on every `get` of an existing entry.
    pub debounce: bool,
}

impl Default for TtlOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            debounce: false,
        }
    }
}

struct ExpiryTimer {
    generation: u64,
    handle: AbortHandle,
}

#[derive(Default)]
struct TimerTable {
    next_generation: u64,
    timers: HashMap<QueryKey, ExpiryTimer>,
}

impl TimerTable {
    fn cancel(&mut self, key: &QueryKey) {
        if let Some(timer) = self.timers.remove(key) {
            timer.handle.abort();
        }
    }
}

/// Time-based expiry.
///
/// Each stored key owns at most one expiry timer. The timer is replaced on
/// every `set` (and on every `get` when debouncing), cancelled when the key
/// is cleared, and dropped once it fires. A fired timer whose generation no
/// longer matches the table is stale and does nothing.
///
/// Dropping the policy aborts every pending timer.
///
/// Expiry clears through the wrapped storage, so place `Ttl` above an
/// ordering policy (`Ttl<Lru<_>>`) for expired entries to leave its order
/// too. Wrapping a [`TruncatableStorage`] makes `Ttl` truncatable as well.
///
/// # Panics
///
/// Timers run on the Tokio runtime: `set`, and `get` when debouncing, panic
/// if called outside one.
pub struct Ttl<S> {
    inner: Arc<S>,
    options: TtlOptions,
    table: Arc<Mutex<TimerTable>>,
}

impl<S> Ttl<S>
where
    S: QueryStorage + 'static,
{
    pub fn new(inner: S, options: TtlOptions) -> Self {
        Self {
            inner: Arc::new(inner),
            options,
            table: Arc::new(Mutex::new(TimerTable::default())),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn options(&self) -> TtlOptions {
        self.options
    }

    /// Number of pending expiry timers.
    pub fn timer_count(&self) -> usize {
        mutex_lock(&self.table, SOURCE, "timer_count").timers.len()
    }

    fn restart_timer(&self, table: &mut TimerTable, key: &QueryKey) {
        let generation = table.next_generation;
        table.next_generation += 1;

        let deadline = Instant::now() + self.options.ttl;
        let inner = Arc::clone(&self.inner);
        let shared = Arc::clone(&self.table);
        let expired = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;

            let mut table = mutex_lock(&shared, SOURCE, "expire");
            let current = table
                .timers
                .get(&expired)
                .is_some_and(|timer| timer.generation == generation);
            if !current {
                return;
            }
            table.timers.remove(&expired);
            inner.clear(&expired);
            debug!(query = %expired, "Cache entry expired");
            record_evictions("ttl", 1);
        })
        .abort_handle();

        if let Some(previous) = table.timers.insert(
            key.clone(),
            ExpiryTimer { generation, handle },
        ) {
            previous.handle.abort();
        }
    }
}

impl<S> QueryStorage for Ttl<S>
where
    S: QueryStorage + 'static,
{
    fn has(&self, key: &QueryKey) -> bool {
        self.inner.has(key)
    }

    fn get(&self, key: &QueryKey) -> Option<Value> {
        if self.options.debounce {
            let mut table = mutex_lock(&self.table, SOURCE, "get");
            if self.inner.has(key) {
                self.restart_timer(&mut table, key);
            }
        }
        self.inner.get(key)
    }

    fn set(&self, key: &QueryKey, value: Value) {
        let mut table = mutex_lock(&self.table, SOURCE, "set");
        self.restart_timer(&mut table, key);
        self.inner.set(key, value);
    }

    fn clear(&self, key: &QueryKey) {
        let mut table = mutex_lock(&self.table, SOURCE, "clear");
        table.cancel(key);
        self.inner.clear(key);
    }
}

impl<S> Drop for Ttl<S> {
    fn drop(&mut self) {
        let mut table = mutex_lock(&self.table, SOURCE, "drop");
        for (_, timer) in table.timers.drain() {
            timer.handle.abort();
        }
    }
}

/// Truncation is delegated to the wrapped policy; timers of the entries it
/// removed are cancelled afterwards.
impl<S> TruncatableStorage for Ttl<S>
where
    S: TruncatableStorage + 'static,
{
    fn truncate(&self, count: usize) {
        if count == 0 {
            return;
        }
        let mut table = mutex_lock(&self.table, SOURCE, "truncate");
        self.inner.truncate(count);
        let inner = &self.inner;
        table.timers.retain(|key, timer| {
            let live = inner.has(key);
            if !live {
                timer.handle.abort();
            }
            live
        });
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}
