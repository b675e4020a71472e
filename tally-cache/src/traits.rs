//! Collaborator traits and cache statistics.
//!
//! This module defines the traits query and write types implement to
//! participate in caching, and the executor seam through which the cache
//! reaches the authoritative data source.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tally_core::TallyResult;

/// Declaration trait for queries whose results may be cached.
///
/// A cacheable query describes its own cache policy: the feature key its
/// entries are derived from, the invalidation tags they register under,
/// optional expiration overrides, and whether results are private to the
/// requesting user.
///
/// # Implementation Requirements
///
/// - `feature_key()` must return a consistent value for all instances
/// - `tags()` should name every tag under which a write could stale this
///   query's results; invalidation is exact-tag-match only
/// - The query itself is the request payload: its serialized form is the
///   key material, so two logically-equal queries must serialize equally
///   (field order is canonicalized by the key builder)
pub trait CacheableQuery: Serialize + Send + Sync {
    /// The result type produced by executing this query.
    type Output: Serialize + DeserializeOwned + Send + Sync;

    /// Stable identifier for this query feature, e.g. `"catalog.product"`.
    fn feature_key(&self) -> &str;

    /// Invalidation tags the cached result registers under.
    fn tags(&self) -> Vec<String>;

    /// Sliding expiration override. `None` uses the configured default.
    fn sliding_expiration(&self) -> Option<Duration> {
        None
    }

    /// Absolute expiration override, measured from population time.
    /// `None` uses the configured default.
    fn absolute_expiration(&self) -> Option<Duration> {
        None
    }

    /// Whether results are scoped to the requesting user. Scoped queries
    /// never share entries across users; unscoped queries intentionally do.
    fn user_scoped(&self) -> bool {
        false
    }

    /// Per-request escape hatch: skip both lookup and population, forcing
    /// a fresh execution while leaving cached state untouched.
    fn bypass_cache(&self) -> bool {
        false
    }
}

/// Declaration trait for writes that invalidate cached query results.
///
/// A write names, at the point of writing data, the exact set of tags whose
/// cached reads could be stale as a result. The set is nonempty by contract;
/// an empty set degrades to a no-op invalidation rather than an error.
pub trait InvalidatingWrite: Send + Sync {
    /// The tags this write invalidates.
    fn invalidated_tags(&self) -> Vec<String>;
}

/// The authoritative data source invoked on cache miss.
///
/// This trait abstracts over the real query execution (repository, database
/// session, remote service), allowing the cache to stay free of persistence
/// concerns. Implementations must tolerate concurrent calls for the same
/// query: the cache performs no single-flight deduplication.
#[async_trait]
pub trait QueryExecutor<Q: CacheableQuery>: Send + Sync {
    /// Execute the query against the authoritative source.
    async fn execute(&self, query: &Q) -> TallyResult<Q::Output>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Estimated memory usage of cached payloads in bytes.
    pub memory_bytes: u64,
    /// Number of evictions due to capacity.
    pub evictions: u64,
    /// Number of entries dropped by expiration.
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_cacheable_query_defaults() {
        #[derive(serde::Serialize)]
        struct Lookup;

        impl CacheableQuery for Lookup {
            type Output = String;

            fn feature_key(&self) -> &str {
                "test.lookup"
            }

            fn tags(&self) -> Vec<String> {
                vec!["test".to_string()]
            }
        }

        let q = Lookup;
        assert_eq!(q.sliding_expiration(), None);
        assert_eq!(q.absolute_expiration(), None);
        assert!(!q.user_scoped());
        assert!(!q.bypass_cache());
    }
}
