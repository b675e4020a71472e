//! Bounded in-memory cache store.
//!
//! Payloads are opaque serialized bytes; the store knows nothing about
//! queries or tags beyond recording which tags an entry was written with.
//! Structural mutations (insert, evict, remove) serialize behind a single
//! mutex per store instance - acceptable for a bounded in-process cache -
//! and no operation performs I/O or fails under normal use.
//!
//! # Eviction
//!
//! When an insert pushes total payload size past the configured memory
//! limit, least-recently-used entries are evicted until usage falls to
//! `(1 - compaction_fraction) * limit`. Every evicted or lazily-expired
//! key is reported to the eviction listener, AFTER the store lock is
//! released, so the listener can reconcile the tag registry without any
//! lock-ordering hazard.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use tally_core::{CachingConfig, Timestamp};

use crate::traits::CacheStats;

/// Callback invoked with each key the store drops on its own accord
/// (capacity eviction or lazy expiry). Explicit `remove` does not fire it:
/// the caller owns registry reconciliation on that path.
pub type EvictionListener = Arc<dyn Fn(&str) + Send + Sync>;

/// Outcome of a `set` operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// The entry was stored.
    Stored,
    /// The payload exceeds the single-entry size cap; nothing was stored.
    RejectedTooLarge,
    /// The store is disabled; the write was silently dropped.
    Dropped,
}

/// A stored cache entry. Owned exclusively by the store.
struct StoredEntry {
    payload: Arc<[u8]>,
    size_bytes: u64,
    sliding: Option<Duration>,
    absolute: Option<Timestamp>,
    tags: HashSet<String>,
    stored_at: Timestamp,
    last_access: Timestamp,
}

#[derive(Default)]
struct StoreInner {
    entries: HashMap<String, StoredEntry>,
    total_bytes: u64,
}

/// Bounded in-memory key→bytes store with per-entry expiration.
///
/// Thread-safe; intended to live as a process-wide singleton shared by all
/// request handlers. Reads record access recency for the LRU eviction
/// order; whether a read also renews the sliding-expiration window is
/// governed by `CachingConfig::refresh_sliding_on_read`.
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
    listener: RwLock<Option<EvictionListener>>,
    config: CachingConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl MemoryStore {
    /// Create a new store governed by `config`.
    ///
    /// The config is trusted here; the orchestrator validates it before
    /// construction.
    pub fn new(config: CachingConfig) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            listener: RwLock::new(None),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Install the eviction listener. Called once at wiring time.
    pub fn set_eviction_listener(&self, listener: EvictionListener) {
        *self.listener.write() = Some(listener);
    }

    /// Look up a payload by key.
    ///
    /// Never fails. Expired entries report not-found; an expired entry
    /// discovered here is purged and reported to the eviction listener.
    /// A hit always refreshes access recency (LRU order); it renews the
    /// sliding window only when the config says so.
    pub fn try_get(&self, key: &str) -> Option<Arc<[u8]>> {
        if !self.config.enabled {
            return None;
        }

        enum Lookup {
            Miss,
            Expired,
            Hit(Arc<[u8]>),
        }

        let now = Utc::now();
        let outcome = {
            let mut inner = self.inner.lock();
            let outcome = match inner.entries.get_mut(key) {
                None => Lookup::Miss,
                Some(entry) => {
                    if Self::is_expired(entry, now, &self.config) {
                        Lookup::Expired
                    } else {
                        entry.last_access = now;
                        Lookup::Hit(Arc::clone(&entry.payload))
                    }
                }
            };
            if matches!(outcome, Lookup::Expired) {
                if let Some(entry) = inner.entries.remove(key) {
                    inner.total_bytes -= entry.size_bytes;
                }
            }
            outcome
        };

        match outcome {
            Lookup::Hit(payload) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(payload)
            }
            Lookup::Expired => {
                self.expirations.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "entry expired");
                self.notify_dropped(&[key.to_string()]);
                None
            }
            Lookup::Miss => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a payload under `key`.
    ///
    /// Overwrites any existing entry with the same key, replacing its
    /// recorded tags; the caller must reconcile the registry. Payloads
    /// larger than the single-entry cap are rejected rather than stored,
    /// so one oversized item can never dominate the cache. May trigger a
    /// compaction pass.
    pub fn set(
        &self,
        key: &str,
        payload: Vec<u8>,
        sliding: Option<Duration>,
        absolute: Option<Timestamp>,
        tags: HashSet<String>,
    ) -> SetOutcome {
        if !self.config.enabled {
            return SetOutcome::Dropped;
        }

        let size_bytes = payload.len() as u64;
        if size_bytes > self.config.max_entry_size_bytes() {
            debug!(key = %key, size_bytes, "payload exceeds max entry size, not cached");
            return SetOutcome::RejectedTooLarge;
        }

        let now = Utc::now();
        let entry = StoredEntry {
            payload: payload.into(),
            size_bytes,
            sliding,
            absolute,
            tags,
            stored_at: now,
            last_access: now,
        };

        let evicted = {
            let mut inner = self.inner.lock();
            if let Some(old) = inner.entries.insert(key.to_string(), entry) {
                inner.total_bytes -= old.size_bytes;
            }
            inner.total_bytes += size_bytes;

            if inner.total_bytes > self.config.memory_limit_bytes() {
                Self::compact(&mut inner, self.config.compaction_target_bytes())
            } else {
                Vec::new()
            }
        };

        if !evicted.is_empty() {
            self.evictions
                .fetch_add(evicted.len() as u64, Ordering::Relaxed);
            debug!(count = evicted.len(), "evicted entries over memory limit");
            self.notify_dropped(&evicted);
        }

        SetOutcome::Stored
    }

    /// Remove an entry. Idempotent; removing a non-existent key is not an
    /// error. Does not fire the eviction listener.
    pub fn remove(&self, key: &str) {
        if !self.config.enabled {
            return;
        }
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.remove(key) {
            inner.total_bytes -= entry.size_bytes;
        }
    }

    /// Tags recorded with the live entry for `key`, if present.
    ///
    /// Diagnostic accessor; the registry is the authority for invalidation.
    pub fn tags_for(&self, key: &str) -> Option<HashSet<String>> {
        self.inner.lock().entries.get(key).map(|e| e.tags.clone())
    }

    /// Number of physically present entries (including not-yet-purged
    /// expired ones).
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Snapshot of usage statistics.
    pub fn stats(&self) -> CacheStats {
        let (entry_count, memory_bytes) = {
            let inner = self.inner.lock();
            (inner.entries.len() as u64, inner.total_bytes)
        };
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count,
            memory_bytes,
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }

    /// Whether `entry` is past either of its expirations at `now`.
    ///
    /// The sliding window is anchored at the last access when reads renew
    /// it, at the write otherwise.
    fn is_expired(entry: &StoredEntry, now: Timestamp, config: &CachingConfig) -> bool {
        if let Some(absolute) = entry.absolute {
            if now >= absolute {
                return true;
            }
        }
        if let Some(sliding) = entry.sliding {
            let anchor = if config.refresh_sliding_on_read {
                entry.last_access
            } else {
                entry.stored_at
            };
            let idle = now
                .signed_duration_since(anchor)
                .to_std()
                .unwrap_or(Duration::ZERO);
            if idle >= sliding {
                return true;
            }
        }
        false
    }

    /// Evict least-recently-used entries until usage is at or below
    /// `target_bytes`. Returns the evicted keys, oldest first.
    fn compact(inner: &mut StoreInner, target_bytes: u64) -> Vec<String> {
        let mut order: Vec<(Timestamp, String)> = inner
            .entries
            .iter()
            .map(|(key, entry)| (entry.last_access, key.clone()))
            .collect();
        order.sort();

        let mut evicted = Vec::new();
        for (_, key) in order {
            if inner.total_bytes <= target_bytes {
                break;
            }
            if let Some(entry) = inner.entries.remove(&key) {
                inner.total_bytes -= entry.size_bytes;
                evicted.push(key);
            }
        }
        evicted
    }

    /// Report dropped keys to the listener, outside the store lock.
    fn notify_dropped(&self, keys: &[String]) {
        let listener = self.listener.read();
        if let Some(listener) = listener.as_ref() {
            for key in keys {
                listener(key);
            }
        }
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MemoryStore")
            .field("entry_count", &inner.entries.len())
            .field("total_bytes", &inner.total_bytes)
            .field("enabled", &self.config.enabled)
            .finish()
    }
}
