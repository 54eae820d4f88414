//! Handler strategies.
//!
//! A handler decides what executing an endpoint means for the cache. The
//! default table has two: `"query"` caches results and subscribes them to
//! their tags, `"mutation"` never caches and broadcasts its tags instead.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use metrics::{counter, histogram};
use serde_json::Value;
use tracing::debug;

use super::endpoint::Endpoint;
use super::error::CacheError;
use super::events::InvalidationSubscription;
use super::keys::{Args, QueryKey};
use super::manager::CacheManager;

pub const QUERY: &str = "query";
pub const MUTATION: &str = "mutation";

const METRIC_HIT_TOTAL: &str = "querycache_hit_total";
const METRIC_MISS_TOTAL: &str = "querycache_miss_total";
const METRIC_REQUEST_MS: &str = "querycache_request_ms";

#[async_trait]
pub trait EndpointHandler: Send + Sync {
    async fn handle(
        &self,
        manager: &CacheManager,
        name: &str,
        endpoint: &Endpoint,
        args: &Args,
    ) -> Result<Value, CacheError>;
}

async fn issue_request(name: &str, endpoint: &Endpoint, args: &Args) -> Result<Value, CacheError> {
    let started_at = Instant::now();
    let result = (endpoint.request)(args.clone())
        .await
        .map_err(|source| CacheError::request(name, source));
    histogram!(METRIC_REQUEST_MS, "endpoint" => name.to_string())
        .record(started_at.elapsed().as_secs_f64() * 1000.0);
    result
}

/// Read handler: serve from storage, otherwise request, store and subscribe.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryHandler;

#[async_trait]
impl EndpointHandler for QueryHandler {
    async fn handle(
        &self,
        manager: &CacheManager,
        name: &str,
        endpoint: &Endpoint,
        args: &Args,
    ) -> Result<Value, CacheError> {
        let key = QueryKey::new(name, args.clone())?;
        let storage = manager.storage();

        if storage.has(&key)
            && let Some(value) = storage.get(&key)
        {
            counter!(METRIC_HIT_TOTAL, "endpoint" => name.to_string()).increment(1);
            debug!(query = %key, "Cache hit");
            return Ok(value);
        }

        counter!(METRIC_MISS_TOTAL, "endpoint" => name.to_string()).increment(1);
        debug!(query = %key, "Cache miss, issuing request");

        let result = issue_request(name, endpoint, args).await?;
        storage.set(&key, result.clone());

        let tags = endpoint.tags_for(args, &result);
        if !tags.is_empty() {
            manager.events().subscribe(InvalidationSubscription {
                key,
                result: result.clone(),
                tags,
                no_clear_on_invalidate: endpoint.no_clear_on_invalidate,
            });
            manager.record_subscriptions();
        }

        Ok(result)
    }
}

/// Write handler: always request, never cache, broadcast the result's tags.
#[derive(Debug, Default, Clone, Copy)]
pub struct MutationHandler;

#[async_trait]
impl EndpointHandler for MutationHandler {
    async fn handle(
        &self,
        manager: &CacheManager,
        name: &str,
        endpoint: &Endpoint,
        args: &Args,
    ) -> Result<Value, CacheError> {
        let result = issue_request(name, endpoint, args).await?;

        let tags = endpoint.tags_for(args, &result);
        if !tags.is_empty() {
            debug!(endpoint = name, ?tags, "Mutation broadcasting tags");
            manager.broadcast(&tags, endpoint.no_clear_on_invalidate);
        }

        Ok(result)
    }
}

/// Handler strategies keyed by endpoint kind.
#[derive(Clone)]
pub struct HandlerTable {
    handlers: HashMap<String, Arc<dyn EndpointHandler>>,
}

impl HandlerTable {
    /// A table with no handlers at all.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn insert<H>(&mut self, kind: impl Into<String>, handler: H)
    where
        H: EndpointHandler + 'static,
    {
        self.handlers.insert(kind.into(), Arc::new(handler));
    }

    pub fn with<H>(mut self, kind: impl Into<String>, handler: H) -> Self
    where
        H: EndpointHandler + 'static,
    {
        self.insert(kind, handler);
        self
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn EndpointHandler>> {
        self.handlers.get(kind).cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::empty()
            .with(QUERY, QueryHandler)
            .with(MUTATION, MutationHandler)
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTable")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_has_query_and_mutation() {
        let table = HandlerTable::default();
        assert_eq!(table.kinds(), vec![MUTATION, QUERY]);
        assert!(HandlerTable::empty().get(QUERY).is_none());
    }

    #[test]
    fn insert_replaces_existing_kind() {
        let table = HandlerTable::default().with(QUERY, MutationHandler);
        assert_eq!(table.kinds().len(), 2);
        assert!(table.contains(QUERY));
    }
}
