//! Read-through cache orchestrator.
//!
//! This module implements the core caching flow: the read path builds the
//! key, checks the store, and on a miss executes the real query, stores
//! the result, and registers its tags; the write path resolves tags to
//! keys through the registry and purges them from the store.
//!
//! Failure to cache is never surfaced as a request failure: every cache
//! anomaly (unserializable key or value, oversized result, stale registry
//! entry) degrades to executing the query directly for that request.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use tally_core::{CacheError, CachingConfig, ConfigError, ScopeContext, TallyResult};

use crate::key::QueryKey;
use crate::registry::TagRegistry;
use crate::store::{MemoryStore, SetOutcome};
use crate::traits::{CacheStats, CacheableQuery, InvalidatingWrite, QueryExecutor};

/// Read-through query cache with tag-based invalidation.
///
/// The façade over [`MemoryStore`], [`QueryKey`] and [`TagRegistry`].
/// Constructed once at process start and shared by every request handler;
/// cloning is cheap and shares the same underlying store and registry.
///
/// # Concurrency
///
/// There is no single-flight deduplication: concurrent misses for the same
/// key may each execute the underlying query and each write the result,
/// last writer wins. Cached reads are idempotent pure lookups, so this is
/// an accepted tradeoff rather than a correctness bug.
pub struct QueryCache {
    store: Arc<MemoryStore>,
    registry: Arc<TagRegistry>,
    config: CachingConfig,
}

impl QueryCache {
    /// Create a new cache governed by `config`.
    ///
    /// Validates the configuration, builds the store and registry, and
    /// wires the store's eviction listener to the registry so that
    /// capacity evictions and lazy expirations keep the tag index
    /// consistent.
    pub fn new(config: CachingConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let store = Arc::new(MemoryStore::new(config.clone()));
        let registry = Arc::new(TagRegistry::new());

        let registry_for_evictions = Arc::clone(&registry);
        store.set_eviction_listener(Arc::new(move |key| {
            registry_for_evictions.unregister(key);
        }));

        Ok(Self {
            store,
            registry,
            config,
        })
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CachingConfig {
        &self.config
    }

    /// Get a reference to the underlying store.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Get a reference to the tag registry.
    pub fn registry(&self) -> &TagRegistry {
        &self.registry
    }

    /// Snapshot of cache usage statistics.
    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    /// Serve `query` from the cache, executing it on a miss.
    ///
    /// The happy read path: derive the key, return the cached result when
    /// present, otherwise execute against `executor`, store the result and
    /// register it under the query's tags.
    ///
    /// Degraded paths, none of which fail the request:
    /// - disabled cache or `bypass_cache()` set: execute directly, touch
    ///   no cached state
    /// - underivable key (unserializable payload, or user-scoped under an
    ///   anonymous scope): execute directly for this request
    /// - unserializable or oversized result: return it fresh, uncached
    /// - undeserializable cached payload: drop the entry, repopulate
    pub async fn get_or_execute<Q, E>(
        &self,
        query: &Q,
        scope: &ScopeContext,
        executor: &E,
    ) -> TallyResult<Q::Output>
    where
        Q: CacheableQuery,
        E: QueryExecutor<Q>,
    {
        if !self.config.enabled || query.bypass_cache() {
            return executor.execute(query).await;
        }

        let key = match QueryKey::for_query(query.feature_key(), query, query.user_scoped(), scope)
        {
            Ok(key) => key,
            Err(e) => {
                warn!(feature = query.feature_key(), error = %e, "cache key underivable, bypassing cache");
                return executor.execute(query).await;
            }
        };

        if let Some(payload) = self.store.try_get(key.as_str()) {
            match serde_json::from_slice::<Q::Output>(&payload) {
                Ok(value) => {
                    debug!(key = %key, "cache hit");
                    return Ok(value);
                }
                Err(e) => {
                    let err = CacheError::ValueDeserialization {
                        key: key.as_str().to_string(),
                        reason: e.to_string(),
                    };
                    warn!(error = %err, "cached payload dropped, repopulating");
                    self.store.remove(key.as_str());
                    self.registry.unregister(key.as_str());
                }
            }
        }

        debug!(key = %key, "cache miss");
        let value = executor.execute(query).await?;

        let payload = match serde_json::to_vec(&value) {
            Ok(payload) => payload,
            Err(e) => {
                let err = CacheError::ValueSerialization {
                    key: key.as_str().to_string(),
                    reason: e.to_string(),
                };
                warn!(error = %err, "result not cached, returning fresh value");
                return Ok(value);
            }
        };

        let sliding = query
            .sliding_expiration()
            .unwrap_or(self.config.default_sliding);
        let absolute = query
            .absolute_expiration()
            .unwrap_or(self.config.default_absolute);
        let absolute_at = chrono::Duration::from_std(absolute)
            .ok()
            .map(|d| Utc::now() + d);

        let tags = query.tags();
        let outcome = self.store.set(
            key.as_str(),
            payload,
            Some(sliding),
            absolute_at,
            tags.iter().cloned().collect::<HashSet<_>>(),
        );
        if outcome == SetOutcome::Stored {
            self.registry.register(key.as_str(), &tags);
        }

        Ok(value)
    }

    /// Invalidate every entry registered under the tags `write` declares.
    pub fn invalidate<W: InvalidatingWrite>(&self, write: &W) {
        self.invalidate_tags(&write.invalidated_tags());
    }

    /// Invalidate every entry registered under any of `tags`.
    ///
    /// Iterates a snapshot per tag; keys evicted concurrently are
    /// tolerated because store removal is idempotent. A no-op when the
    /// cache is disabled or the tag set is empty.
    pub fn invalidate_tags(&self, tags: &[String]) {
        if !self.config.enabled {
            return;
        }
        if tags.is_empty() {
            debug!("invalidation declared no tags, nothing to do");
            return;
        }

        for tag in tags {
            let keys = self.registry.keys_for_tag(tag);
            debug!(tag = %tag, count = keys.len(), "invalidating tag");
            for key in keys {
                self.store.remove(&key);
                self.registry.unregister(&key);
            }
        }
    }

    /// Remove a single cached entry and its tag registrations.
    pub fn remove(&self, key: &QueryKey) {
        self.store.remove(key.as_str());
        self.registry.unregister(key.as_str());
    }
}

impl Clone for QueryCache {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
        }
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("enabled", &self.config.enabled)
            .field("store", &self.store)
            .finish()
    }
}
