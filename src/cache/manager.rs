//! Cache manager.
//!
//! Ties the storage stack, the handler table, the endpoint registry and the
//! event channel together, and is the entry point applications call.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use metrics::{counter, gauge};
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use super::config::CacheConfig;
use super::endpoint::{Endpoint, EndpointOverrides};
use super::error::CacheError;
use super::events::{CacheEvent, EventChannel, InvalidatedQuery};
use super::handlers::{EndpointHandler, HandlerTable};
use super::keys::Args;
use super::lock::{rw_read, rw_write};
use super::registry::EndpointRegistry;
use super::store::{MemoryStorage, QueryStorage};
use crate::config::LoadError;

const SOURCE: &str = "cache::manager";
const METRIC_INVALIDATED_TOTAL: &str = "querycache_invalidated_total";
const METRIC_SUBSCRIPTIONS: &str = "querycache_subscriptions";

/// The two operations callers need from a cache.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn execute(
        &self,
        name: &str,
        endpoint: &Endpoint,
        args: Args,
    ) -> Result<Value, CacheError>;

    fn invalidate(&self, tags: &[String]);
}

pub struct CacheManager {
    storage: Arc<dyn QueryStorage>,
    handlers: RwLock<HandlerTable>,
    registry: EndpointRegistry,
    events: EventChannel,
}

impl CacheManager {
    pub fn new(storage: Arc<dyn QueryStorage>, handlers: HandlerTable) -> Self {
        Self {
            storage,
            handlers: RwLock::new(handlers),
            registry: EndpointRegistry::new(),
            events: EventChannel::new(),
        }
    }

    /// Manager over unbounded memory storage with the default handlers and
    /// the given endpoints registered.
    pub fn with_endpoints<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = (S, Endpoint)>,
        S: Into<String>,
    {
        let manager = Self::new(Arc::new(MemoryStorage::new()), HandlerTable::default());
        for (name, endpoint) in endpoints {
            manager.register(name, endpoint);
        }
        manager
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self, LoadError> {
        let storage = config.build_storage()?;
        info!(
            eviction = ?config.eviction,
            max_entries = ?config.max_entries,
            ttl_ms = ?config.ttl_ms,
            "Cache storage configured"
        );
        Ok(Self::new(storage, HandlerTable::default()))
    }

    /// The live, decorated storage handle.
    pub fn storage(&self) -> &dyn QueryStorage {
        self.storage.as_ref()
    }

    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    pub fn register(&self, name: impl Into<String>, endpoint: Endpoint) {
        self.registry.register(name, endpoint);
    }

    pub fn register_handler<H>(&self, kind: impl Into<String>, handler: H)
    where
        H: EndpointHandler + 'static,
    {
        let kind = kind.into();
        debug!(kind = %kind, "Handler registered");
        rw_write(&self.handlers, SOURCE, "register_handler").insert(kind, handler);
    }

    pub fn endpoint(&self, name: &str) -> Option<Endpoint> {
        self.registry.get(name)
    }

    pub fn endpoint_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Run `endpoint` through the handler registered for its kind.
    ///
    /// With an optimistic request the optimistic value is returned at once
    /// and the handler runs on a background task; its outcome is logged
    /// and otherwise dropped. Outside a Tokio runtime the handler is awaited
    /// before the optimistic value is returned.
    pub async fn execute(
        self: &Arc<Self>,
        name: &str,
        endpoint: &Endpoint,
        args: Args,
    ) -> Result<Value, CacheError> {
        let handler = rw_read(&self.handlers, SOURCE, "execute")
            .get(&endpoint.kind)
            .ok_or_else(|| CacheError::missing_handler(&endpoint.kind))?;

        let Some(optimistic) = endpoint.optimistic_request.as_ref() else {
            return handler.handle(self, name, endpoint, &args).await;
        };

        let value = optimistic(self.storage(), &args);

        let manager = Arc::clone(self);
        let name = name.to_string();
        let endpoint = endpoint.clone();
        let request = async move {
            if let Err(err) = handler.handle(&manager, &name, &endpoint, &args).await {
                warn!(
                    endpoint = %name,
                    error = %err,
                    "Background request after optimistic result failed"
                );
            }
        };

        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(request);
            }
            Err(_) => {
                debug!("No async runtime for optimistic request; running it inline");
                request.await;
            }
        }

        Ok(value)
    }

    /// Look up `name`, merge `overrides` over it and execute it.
    pub async fn execute_endpoint(
        self: &Arc<Self>,
        name: &str,
        args: Args,
        overrides: Option<EndpointOverrides>,
    ) -> Result<Value, CacheError> {
        let registered = self
            .registry
            .get(name)
            .ok_or_else(|| CacheError::missing_endpoint(name))?;
        let endpoint = match overrides {
            Some(overrides) => overrides.apply(registered),
            None => registered,
        };

        self.execute(name, &endpoint, args).await
    }

    /// Broadcast `tags` with default clear behaviour. Empty tags are a no-op.
    pub fn invalidate(&self, tags: &[String]) {
        if tags.is_empty() {
            return;
        }
        self.broadcast(tags, false);
    }

    /// Emit an `Invalidate` event and fire every subscription it matches.
    ///
    /// Matching subscriptions are detached before any listener runs, so
    /// subscriptions created during delivery are left for the next broadcast.
    pub(crate) fn broadcast(&self, tags: &[String], no_clear: bool) {
        info!(?tags, no_clear, "Broadcasting invalidation");
        let matched = self.events.take_matching(tags);
        self.record_subscriptions();

        self.events.emit(&CacheEvent::Invalidate {
            tags: tags.to_vec(),
            no_clear,
        });

        for (subscription, matched_tags) in matched {
            counter!(METRIC_INVALIDATED_TOTAL).increment(1);
            debug!(query = %subscription.key, tags = ?matched_tags, "Query invalidated");

            self.events.emit(&CacheEvent::InvalidatedQuery(InvalidatedQuery {
                name: subscription.key.name().to_string(),
                args: subscription.key.args().clone(),
                result: subscription.result,
                tags: matched_tags,
            }));

            if !(subscription.no_clear_on_invalidate || no_clear) {
                self.storage.clear(&subscription.key);
            }
        }
    }

    pub(crate) fn record_subscriptions(&self) {
        gauge!(METRIC_SUBSCRIPTIONS).set(self.events.subscription_count() as f64);
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("handlers", &*rw_read(&self.handlers, SOURCE, "debug"))
            .field("registry", &self.registry)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Cache for Arc<CacheManager> {
    async fn execute(
        &self,
        name: &str,
        endpoint: &Endpoint,
        args: Args,
    ) -> Result<Value, CacheError> {
        CacheManager::execute(self, name, endpoint, args).await
    }

    fn invalidate(&self, tags: &[String]) {
        CacheManager::invalidate(self, tags);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::cache::error::BoxError;
    use crate::cache::handlers::QUERY;

    fn constant(value: Value) -> Endpoint {
        Endpoint::query(move |_args| {
            let value = value.clone();
            async move { Ok::<_, BoxError>(value) }
        })
    }

    #[tokio::test]
    async fn missing_handler_fails_fast() {
        let manager = Arc::new(CacheManager::new(
            Arc::new(MemoryStorage::new()),
            HandlerTable::empty(),
        ));

        let error = manager
            .execute("user", &constant(json!(1)), Vec::new())
            .await
            .expect_err("no handler is registered");
        assert!(matches!(error, CacheError::MissingHandler { ref kind } if kind == QUERY));
    }

    #[tokio::test]
    async fn missing_endpoint_fails_fast() {
        let manager = Arc::new(CacheManager::with_endpoints([("user", constant(json!(1)))]));

        let error = manager
            .execute_endpoint("post", Vec::new(), None)
            .await
            .expect_err("endpoint is not registered");
        assert!(error.is_configuration());
        assert_eq!(manager.endpoint_names(), vec!["user"]);
    }

    #[test]
    fn empty_invalidate_emits_nothing() {
        let manager = CacheManager::with_endpoints(Vec::<(String, Endpoint)>::new());
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        manager
            .events()
            .add_listener(move |event| sink.lock().expect("sink lock").push(event.clone()));

        manager.invalidate(&[]);
        assert!(seen.lock().expect("sink lock").is_empty());

        manager.invalidate(&["t1".to_string()]);
        assert_eq!(seen.lock().expect("sink lock").len(), 1);
    }

    #[test]
    fn from_config_rejects_invalid_stack() {
        let config = CacheConfig {
            max_entries: Some(5),
            ..CacheConfig::default()
        };
        assert!(CacheManager::from_config(&config).is_err());
    }
}
