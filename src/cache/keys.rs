//! Query key definitions.
//!
//! A [`QueryKey`] identifies a cached result by operation name and argument
//! tuple. Argument tuples are compared structurally: two tuples collide iff
//! their canonical JSON forms are equal, regardless of which instances they
//! were built from.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::error::CacheError;

/// Ordered argument tuple passed to an endpoint request.
pub type Args = Vec<Value>;

/// Identity of a cached item: operation name plus structurally compared args.
#[derive(Clone)]
pub struct QueryKey {
    name: Arc<str>,
    args: Arc<Args>,
    canonical: Arc<str>,
}

impl QueryKey {
    /// Build a key, canonicalising the argument tuple.
    ///
    /// `serde_json::Map` keeps object keys sorted, so the serialised form is
    /// deterministic for deep-equal tuples.
    pub fn new(name: impl Into<String>, args: Args) -> Result<Self, CacheError> {
        let name: String = name.into();
        let canonical = serde_json::to_string(&args).map_err(|source| CacheError::Key {
            name: name.clone(),
            source,
        })?;

        Ok(Self {
            name: name.into(),
            args: Arc::new(args),
            canonical: canonical.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    /// The canonical structural form used for equality and hashing.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }
}

impl PartialEq for QueryKey {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.canonical == other.canonical
    }
}

impl Eq for QueryKey {}

impl Hash for QueryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.canonical.hash(state);
    }
}

impl fmt::Debug for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("QueryKey")
            .field(&self.name)
            .field(&self.canonical)
            .finish()
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.canonical)
    }
}

/// Convert any serialisable value into an argument tuple.
///
/// Tuples, arrays and sequences become one argument per element, `()`
/// becomes the empty tuple, anything else becomes a single argument.
/// Values with no JSON form (for example maps keyed by non-strings) are
/// rejected instead of being compared by identity.
pub fn to_args<T: Serialize + ?Sized>(value: &T) -> Result<Args, CacheError> {
    match serde_json::to_value(value).map_err(CacheError::Args)? {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Ok(vec![other]),
    }
}
