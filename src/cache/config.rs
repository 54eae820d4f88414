//! Cache configuration.
//!
//! Describes the storage stack as data, loaded from the `[cache]` table of
//! `querycache.toml` or `QUERYCACHE__CACHE__*` environment variables:
//!
//! ```toml
//! [cache]
//! eviction = "lru"
//! max_entries = 500
//! throttle_ms = 50
//! ttl_ms = 30000
//! ttl_debounce = true
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::policy::{Fifo, Lfu, Lru, Mru, SizeLimit, SizeLimitOptions, Ttl, TtlOptions};
use super::store::{MemoryStorage, QueryStorage, TruncatableStorage};
use crate::config::LoadError;

/// Policy that picks truncation victims.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    #[default]
    None,
    Fifo,
    Lru,
    Mru,
    Lfu,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub eviction: EvictionPolicy,
    /// Bound on tracked entries. Requires an eviction policy to pick victims.
    pub max_entries: Option<usize>,
    /// Throttle window for size-limit truncation; `0` truncates on every set.
    pub throttle_ms: u64,
    /// Expire entries this long after they were stored.
    pub ttl_ms: Option<u64>,
    /// Restart the expiry window on every read of an existing entry.
    pub ttl_debounce: bool,
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), LoadError> {
        match self.max_entries {
            Some(0) => {
                return Err(LoadError::invalid(
                    "cache.max_entries",
                    "must be greater than zero",
                ));
            }
            Some(_) if self.eviction == EvictionPolicy::None => {
                return Err(LoadError::invalid(
                    "cache.max_entries",
                    "requires an eviction policy to choose victims",
                ));
            }
            _ => {}
        }

        if self.ttl_ms == Some(0) {
            return Err(LoadError::invalid("cache.ttl_ms", "must be greater than zero"));
        }

        if self.ttl_debounce && self.ttl_ms.is_none() {
            return Err(LoadError::invalid("cache.ttl_debounce", "requires `cache.ttl_ms`"));
        }

        Ok(())
    }

    pub fn throttle(&self) -> Option<Duration> {
        (self.throttle_ms > 0).then(|| Duration::from_millis(self.throttle_ms))
    }

    pub fn ttl(&self) -> Option<TtlOptions> {
        self.ttl_ms.map(|ttl_ms| TtlOptions {
            ttl: Duration::from_millis(ttl_ms),
            debounce: self.ttl_debounce,
        })
    }

    /// Compose the configured stack, outermost first:
    /// size limit, TTL, eviction policy, memory storage.
    ///
    /// TTL sits above the eviction policy so that expiry also drops the
    /// policy's order record. A TTL layer needs a Tokio runtime once entries
    /// are stored.
    pub fn build_storage(&self) -> Result<Arc<dyn QueryStorage>, LoadError> {
        self.validate()?;

        let base = MemoryStorage::new();
        Ok(match self.eviction {
            EvictionPolicy::None => match self.ttl() {
                Some(options) => Arc::new(Ttl::new(base, options)),
                None => Arc::new(base),
            },
            EvictionPolicy::Fifo => self.with_policy(Fifo::new(base)),
            EvictionPolicy::Lru => self.with_policy(Lru::new(base)),
            EvictionPolicy::Mru => self.with_policy(Mru::new(base)),
            EvictionPolicy::Lfu => self.with_policy(Lfu::new(base)),
        })
    }

    fn with_policy<P>(&self, policy: P) -> Arc<dyn QueryStorage>
    where
        P: TruncatableStorage + 'static,
    {
        match self.ttl() {
            Some(options) => self.bounded(Ttl::new(policy, options)),
            None => self.bounded(policy),
        }
    }

    fn bounded<P>(&self, policy: P) -> Arc<dyn QueryStorage>
    where
        P: TruncatableStorage + 'static,
    {
        match self.max_entries {
            Some(max_entries) => Arc::new(SizeLimit::new(
                policy,
                SizeLimitOptions {
                    max_entries,
                    throttle: self.throttle(),
                },
            )),
            None => Arc::new(policy),
        }
    }
}
