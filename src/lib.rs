//! querycache: a result cache for asynchronous request/response endpoints.
//!
//! Endpoints are registered with a handler type (`"query"` caches and
//! subscribes, `"mutation"` fetches and broadcasts) and optional invalidation
//! tags derived from their arguments and result. Storage is a small
//! synchronous contract that eviction policies decorate; see [`cache`].
//!
//! ```ignore
//! let manager = Arc::new(CacheManager::from_config(&CacheConfig::default())?);
//! manager.register("user", Endpoint::query(fetch_user).with_tags(user_tags));
//! let user = manager.execute_endpoint("user", to_args(&(42,))?, None).await?;
//! manager.invalidate(&["user:42".to_string()]);
//! ```

pub mod cache;
pub mod config;
pub mod infra;

pub use cache::{
    Args, BoxError, Cache, CacheConfig, CacheError, CacheEvent, CacheManager, Endpoint,
    EndpointHandler, EndpointOverrides, EventChannel, EvictionPolicy, HandlerTable,
    InvalidatedQuery, MemoryStorage, QueryKey, QueryStorage, TruncatableStorage, to_args,
};
