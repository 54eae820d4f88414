//! Invalidation event channel.
//!
//! The manager owns one [`EventChannel`]. It carries two kinds of traffic:
//!
//! - one-shot [`InvalidationSubscription`]s created by the read handler for
//!   tagged results, matched against broadcast tags;
//! - listeners observing every [`CacheEvent`] the manager emits.
//!
//! Subscriptions are removed from the channel before anyone is notified, so
//! each fires at most once even if several tags or several broadcasts match.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::debug;

use super::keys::{Args, QueryKey};
use super::lock::mutex_lock;

const SOURCE: &str = "cache::events";

/// Registration order of a subscription. Lower ids were registered earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Pending invalidation for one cached read result.
#[derive(Debug, Clone)]
pub struct InvalidationSubscription {
    pub key: QueryKey,
    pub result: Value,
    pub tags: Vec<String>,
    /// Keep the storage entry when the subscription fires.
    pub no_clear_on_invalidate: bool,
}

impl InvalidationSubscription {
    fn matching_tags(&self, broadcast: &[String]) -> Vec<String> {
        self.tags
            .iter()
            .filter(|tag| broadcast.contains(tag))
            .cloned()
            .collect()
    }
}

/// Notification that a cached read result was invalidated.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidatedQuery {
    pub name: String,
    pub args: Args,
    pub result: Value,
    /// Subscription tags that intersected the broadcast.
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    /// Tags broadcast by a mutation or an explicit `invalidate`.
    Invalidate { tags: Vec<String>, no_clear: bool },
    InvalidatedQuery(InvalidatedQuery),
}

type Listener = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

pub struct EventChannel {
    subscriptions: Mutex<BTreeMap<SubscriptionId, InvalidationSubscription>>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl EventChannel {
    pub fn new() -> Self {
        Self {
            subscriptions: Mutex::new(BTreeMap::new()),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn subscribe(&self, subscription: InvalidationSubscription) -> SubscriptionId {
        let id = SubscriptionId(self.next_id());
        debug!(
            query = %subscription.key,
            tags = ?subscription.tags,
            subscription = id.0,
            "Invalidation subscription registered"
        );
        mutex_lock(&self.subscriptions, SOURCE, "subscribe").insert(id, subscription);
        id
    }

    /// Remove a subscription. Returns false if it already fired or was removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        mutex_lock(&self.subscriptions, SOURCE, "unsubscribe")
            .remove(&id)
            .is_some()
    }

    pub fn subscription_count(&self) -> usize {
        mutex_lock(&self.subscriptions, SOURCE, "subscription_count").len()
    }

    /// Observe every event emitted on this channel, in emission order.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id());
        mutex_lock(&self.listeners, SOURCE, "add_listener").push((id, Arc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = mutex_lock(&self.listeners, SOURCE, "remove_listener");
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Deliver `event` to the listeners registered at call time.
    ///
    /// Listeners run without the channel lock held and may register or
    /// remove listeners themselves.
    pub fn emit(&self, event: &CacheEvent) {
        let snapshot: Vec<Listener> = mutex_lock(&self.listeners, SOURCE, "emit")
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            listener(event);
        }
    }

    /// Detach every subscription whose tags intersect `tags`, in registration
    /// order, paired with the intersecting tags.
    pub(crate) fn take_matching(
        &self,
        tags: &[String],
    ) -> Vec<(InvalidationSubscription, Vec<String>)> {
        let mut subscriptions = mutex_lock(&self.subscriptions, SOURCE, "take_matching");
        let matched: Vec<(SubscriptionId, Vec<String>)> = subscriptions
            .iter()
            .filter_map(|(id, subscription)| {
                let hits = subscription.matching_tags(tags);
                (!hits.is_empty()).then_some((*id, hits))
            })
            .collect();

        matched
            .into_iter()
            .filter_map(|(id, hits)| subscriptions.remove(&id).map(|sub| (sub, hits)))
            .collect()
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("subscriptions", &self.subscription_count())
            .field(
                "listeners",
                &mutex_lock(&self.listeners, SOURCE, "debug").len(),
            )
            .finish()
    }
}
