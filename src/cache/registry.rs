//! Endpoint registry.
//!
//! Maps operation names to their [`Endpoint`] definitions. Registration
//! overwrites; lookups hand out clones so no lock outlives the call.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use super::endpoint::Endpoint;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::registry";

#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: RwLock<HashMap<String, Endpoint>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the endpoint registered under `name`.
    pub fn register(&self, name: impl Into<String>, endpoint: Endpoint) {
        let name = name.into();
        debug!(endpoint = %name, kind = %endpoint.kind, "Endpoint registered");
        let replaced = rw_write(&self.endpoints, SOURCE, "register").insert(name.clone(), endpoint);
        if replaced.is_some() {
            debug!(endpoint = %name, "Replaced previous endpoint definition");
        }
    }

    pub fn get(&self, name: &str) -> Option<Endpoint> {
        rw_read(&self.endpoints, SOURCE, "get").get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = rw_read(&self.endpoints, SOURCE, "names")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        rw_read(&self.endpoints, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: Into<String>> FromIterator<(S, Endpoint)> for EndpointRegistry {
    fn from_iter<I: IntoIterator<Item = (S, Endpoint)>>(iter: I) -> Self {
        let registry = Self::new();
        for (name, endpoint) in iter {
            registry.register(name, endpoint);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::cache::error::BoxError;
    use crate::cache::handlers::{MUTATION, QUERY};

    fn endpoint(kind: &str) -> Endpoint {
        Endpoint::new(kind, |_args| async { Ok::<_, BoxError>(Value::Null) })
    }

    #[test]
    fn register_overwrites_existing_name() {
        let registry = EndpointRegistry::new();
        registry.register("user", endpoint(QUERY));
        registry.register("user", endpoint(MUTATION));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("user").map(|e| e.kind), Some(MUTATION.to_string()));
        assert!(registry.get("post").is_none());
    }

    #[test]
    fn collects_from_pairs() {
        let registry: EndpointRegistry = [("post", endpoint(QUERY)), ("author", endpoint(QUERY))]
            .into_iter()
            .collect();

        assert_eq!(registry.names(), vec!["author", "post"]);
    }
}
