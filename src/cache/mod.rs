//! Query result cache.
//!
//! Results of registered endpoints are cached by [`QueryKey`] in a
//! [`QueryStorage`] stack and invalidated by tag:
//!
//! - **Storage**: [`MemoryStorage`] wrapped in any nesting of the
//!   [`policy`] decorators (FIFO, LRU, MRU, LFU, size limit, TTL).
//! - **Handlers**: `"query"` endpoints are cached and subscribed to their
//!   tags; `"mutation"` endpoints broadcast their tags.
//! - **Manager**: [`CacheManager`] registers endpoints and handlers, executes
//!   them, and publishes [`CacheEvent`]s on its [`EventChannel`].
//!
//! ## Configuration
//!
//! The storage stack can be described by [`CacheConfig`], see `config.rs`
//! for all options.

mod config;
mod endpoint;
mod error;
mod events;
mod handlers;
mod keys;
mod lock;
mod manager;
pub mod policy;
mod registry;
mod store;

pub use config::{CacheConfig, EvictionPolicy};
pub use endpoint::{Endpoint, EndpointOverrides, OptimisticFn, RequestFn, TagsFn};
pub use error::{BoxError, CacheError};
pub use events::{
    CacheEvent, EventChannel, InvalidatedQuery, InvalidationSubscription, ListenerId,
    SubscriptionId,
};
pub use handlers::{EndpointHandler, HandlerTable, MUTATION, MutationHandler, QUERY, QueryHandler};
pub use keys::{Args, QueryKey, to_args};
pub use manager::{Cache, CacheManager};
pub use registry::EndpointRegistry;
pub use store::{MemoryStorage, QueryStorage, TruncatableStorage};
