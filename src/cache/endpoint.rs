//! Endpoint definitions.
//!
//! An [`Endpoint`] is everything the cache knows about one operation: which
//! handler runs it, how to issue the request, and optionally how to tag its
//! result and how to answer optimistically.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use super::error::BoxError;
use super::handlers::{MUTATION, QUERY};
use super::keys::Args;
use super::store::QueryStorage;

pub type RequestFn = Arc<dyn Fn(Args) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync>;

/// Produces a result synchronously from the live storage.
pub type OptimisticFn = Arc<dyn Fn(&dyn QueryStorage, &Args) -> Value + Send + Sync>;

/// Derives invalidation tags from the arguments and the resolved result.
pub type TagsFn = Arc<dyn Fn(&Args, &Value) -> Vec<String> + Send + Sync>;

#[derive(Clone)]
pub struct Endpoint {
    pub kind: String,
    pub request: RequestFn,
    pub optimistic_request: Option<OptimisticFn>,
    pub tags: Option<TagsFn>,
    pub no_clear_on_invalidate: bool,
}

impl Endpoint {
    pub fn new<F, Fut, E>(kind: impl Into<String>, request: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let request: RequestFn =
            Arc::new(move |args| request(args).map(|result| result.map_err(Into::into)).boxed());

        Self {
            kind: kind.into(),
            request,
            optimistic_request: None,
            tags: None,
            no_clear_on_invalidate: false,
        }
    }

    /// Cached read endpoint, run by the `"query"` handler.
    pub fn query<F, Fut, E>(request: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self::new(QUERY, request)
    }

    /// Uncached write endpoint, run by the `"mutation"` handler.
    pub fn mutation<F, Fut, E>(request: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self::new(MUTATION, request)
    }

    pub fn with_tags<F>(mut self, tags: F) -> Self
    where
        F: Fn(&Args, &Value) -> Vec<String> + Send + Sync + 'static,
    {
        self.tags = Some(Arc::new(tags));
        self
    }

    pub fn with_optimistic<F>(mut self, optimistic: F) -> Self
    where
        F: Fn(&dyn QueryStorage, &Args) -> Value + Send + Sync + 'static,
    {
        self.optimistic_request = Some(Arc::new(optimistic));
        self
    }

    pub fn with_no_clear_on_invalidate(mut self, no_clear: bool) -> Self {
        self.no_clear_on_invalidate = no_clear;
        self
    }

    /// Tags for a resolved result; empty when the endpoint defines none.
    pub fn tags_for(&self, args: &Args, result: &Value) -> Vec<String> {
        self.tags
            .as_ref()
            .map(|tags| tags(args, result))
            .unwrap_or_default()
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("kind", &self.kind)
            .field("optimistic_request", &self.optimistic_request.is_some())
            .field("tags", &self.tags.is_some())
            .field("no_clear_on_invalidate", &self.no_clear_on_invalidate)
            .finish_non_exhaustive()
    }
}

/// Per-call replacements merged over a registered endpoint.
///
/// The request function itself cannot be overridden.
#[derive(Clone, Default)]
pub struct EndpointOverrides {
    pub kind: Option<String>,
    pub tags: Option<TagsFn>,
    pub optimistic_request: Option<OptimisticFn>,
    pub no_clear_on_invalidate: Option<bool>,
}

impl EndpointOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn tags<F>(mut self, tags: F) -> Self
    where
        F: Fn(&Args, &Value) -> Vec<String> + Send + Sync + 'static,
    {
        self.tags = Some(Arc::new(tags));
        self
    }

    pub fn optimistic<F>(mut self, optimistic: F) -> Self
    where
        F: Fn(&dyn QueryStorage, &Args) -> Value + Send + Sync + 'static,
    {
        self.optimistic_request = Some(Arc::new(optimistic));
        self
    }

    pub fn no_clear_on_invalidate(mut self, no_clear: bool) -> Self {
        self.no_clear_on_invalidate = Some(no_clear);
        self
    }

    pub fn apply(self, mut endpoint: Endpoint) -> Endpoint {
        if let Some(kind) = self.kind {
            endpoint.kind = kind;
        }
        if let Some(tags) = self.tags {
            endpoint.tags = Some(tags);
        }
        if let Some(optimistic) = self.optimistic_request {
            endpoint.optimistic_request = Some(optimistic);
        }
        if let Some(no_clear) = self.no_clear_on_invalidate {
            endpoint.no_clear_on_invalidate = no_clear;
        }
        endpoint
    }
}

impl fmt::Debug for EndpointOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointOverrides")
            .field("kind", &self.kind)
            .field("tags", &self.tags.is_some())
            .field("optimistic_request", &self.optimistic_request.is_some())
            .field("no_clear_on_invalidate", &self.no_clear_on_invalidate)
            .finish()
    }
}
