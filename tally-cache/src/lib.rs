//! Query result cache with tag-based invalidation and per-user scoping.
//!
//! This crate provides a read-through cache for expensive lookup queries:
//! on a miss it invokes the authoritative data source itself, stores the
//! result, and registers the entry under the invalidation tags its query
//! declares. A write then invalidates by tag, without knowing which cache
//! keys currently exist.
//!
//! # Architecture
//!
//! - [`MemoryStore`] - bounded in-memory key/value store with sliding and
//!   absolute expiration and LRU size-based compaction
//! - [`QueryKey`] - deterministic cache key derivation with canonical
//!   payload serialization and optional per-user scoping
//! - [`TagRegistry`] - the tag ↔ key index answering "which keys does this
//!   tag cover"
//! - [`QueryCache`] - the façade combining the three: read-through on the
//!   query path, tag resolution + purge on the write path
//!
//! # Example
//!
//! ```ignore
//! let cache = QueryCache::new(CachingConfig::default())?;
//!
//! // Read path: populated on first miss, served from cache afterwards
//! let products = cache.get_or_execute(&query, &scope, &db).await?;
//!
//! // Write path: purge every entry registered under the write's tags
//! cache.invalidate(&update_command);
//! ```
//!
//! The cache is a process-wide singleton: one long-lived instance shared by
//! every request handler. All operations are safe under concurrent use and
//! perform no I/O; only the underlying query execution is async.

pub mod key;
pub mod read_through;
pub mod registry;
pub mod store;
pub mod traits;

pub use key::QueryKey;
pub use read_through::QueryCache;
pub use registry::TagRegistry;
pub use store::{MemoryStore, SetOutcome};
pub use traits::{CacheStats, CacheableQuery, InvalidatingWrite, QueryExecutor};
