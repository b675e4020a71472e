//! Tag registry - the tag ↔ key index behind invalidation.
//!
//! The registry answers "which cache keys does this tag currently cover"
//! without the store having to scan its entries. It is deliberately
//! decoupled from the store's storage mechanics: the two are reconciled
//! lazily (idempotent removals, eviction listener), never inside one
//! shared critical section.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tracing::debug;

/// Many-to-many index between invalidation tags and live cache keys.
///
/// Both directions are kept: the forward index (`tag → keys`) serves
/// invalidation lookups, the reverse index (`key → tags`) makes
/// re-registration diffs and eviction-driven unregistration O(tag count)
/// instead of a full scan.
///
/// A key may transiently appear here after its store entry expired, and a
/// store entry may transiently lack a registration. Both states are
/// harmless: the first resolves through idempotent store removal, the
/// second means the entry is unreachable by tag and ages out naturally.
#[derive(Default)]
pub struct TagRegistry {
    inner: RwLock<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    /// Forward index: tag → keys registered under it.
    keys_by_tag: HashMap<String, HashSet<String>>,
    /// Reverse index: key → tags it is registered under.
    tags_by_key: HashMap<String, HashSet<String>>,
}

impl TagRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `key` with exactly `tags`.
    ///
    /// Replace semantics, not additive: associations from a previous
    /// registration of the same key that are absent from `tags` are
    /// removed. Registering with an empty tag set unregisters the key.
    pub fn register(&self, key: &str, tags: &[String]) {
        let new_tags: HashSet<String> = tags.iter().cloned().collect();

        let mut inner = self.inner.write();
        let RegistryInner {
            keys_by_tag,
            tags_by_key,
        } = &mut *inner;

        let old_tags = if new_tags.is_empty() {
            tags_by_key.remove(key).unwrap_or_default()
        } else {
            tags_by_key
                .insert(key.to_string(), new_tags.clone())
                .unwrap_or_default()
        };

        for stale in old_tags.difference(&new_tags) {
            if let Some(keys) = keys_by_tag.get_mut(stale) {
                keys.remove(key);
                if keys.is_empty() {
                    keys_by_tag.remove(stale);
                }
            }
        }

        for added in new_tags.difference(&old_tags) {
            keys_by_tag
                .entry(added.clone())
                .or_default()
                .insert(key.to_string());
        }

        debug!(key = %key, tags = new_tags.len(), "registered cache key");
    }

    /// Remove `key` from every tag's set.
    ///
    /// Idempotent; unregistering an unknown key is not an error. Tags whose
    /// sets become empty are pruned (pure optimization, no observable
    /// behavior difference).
    pub fn unregister(&self, key: &str) {
        let mut inner = self.inner.write();
        let RegistryInner {
            keys_by_tag,
            tags_by_key,
        } = &mut *inner;

        let Some(tags) = tags_by_key.remove(key) else {
            return;
        };

        for tag in &tags {
            if let Some(keys) = keys_by_tag.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    keys_by_tag.remove(tag);
                }
            }
        }

        debug!(key = %key, "unregistered cache key");
    }

    /// Snapshot of the keys currently registered under `tag`.
    ///
    /// Callers iterate the snapshot while issuing store removals; a key
    /// evicted concurrently is tolerated because store removal is
    /// idempotent.
    pub fn keys_for_tag(&self, tag: &str) -> HashSet<String> {
        self.inner
            .read()
            .keys_by_tag
            .get(tag)
            .cloned()
            .unwrap_or_default()
    }

    /// Tags currently registered for `key`.
    pub fn tags_for_key(&self, key: &str) -> HashSet<String> {
        self.inner
            .read()
            .tags_by_key
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of tags with at least one registered key.
    pub fn tag_count(&self) -> usize {
        self.inner.read().keys_by_tag.len()
    }

    /// Number of registered keys.
    pub fn key_count(&self) -> usize {
        self.inner.read().tags_by_key.len()
    }

    /// Whether the registry holds no associations.
    pub fn is_empty(&self) -> bool {
        self.inner.read().tags_by_key.is_empty()
    }
}

impl std::fmt::Debug for TagRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("TagRegistry")
            .field("tag_count", &inner.keys_by_tag.len())
            .field("key_count", &inner.tags_by_key.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = TagRegistry::new();
        registry.register("k1", &tags(&["products", "inventory"]));

        assert_eq!(
            registry.keys_for_tag("products"),
            HashSet::from(["k1".to_string()])
        );
        assert_eq!(
            registry.keys_for_tag("inventory"),
            HashSet::from(["k1".to_string()])
        );
        assert_eq!(
            registry.tags_for_key("k1"),
            HashSet::from(["products".to_string(), "inventory".to_string()])
        );
    }

    #[test]
    fn test_lookup_unknown_tag_is_empty() {
        let registry = TagRegistry::new();
        assert!(registry.keys_for_tag("nothing").is_empty());
    }

    #[test]
    fn test_reregister_replaces_not_merges() {
        let registry = TagRegistry::new();
        registry.register("k1", &tags(&["products", "pricing"]));
        registry.register("k1", &tags(&["pricing", "promotions"]));

        assert!(registry.keys_for_tag("products").is_empty());
        assert_eq!(
            registry.keys_for_tag("pricing"),
            HashSet::from(["k1".to_string()])
        );
        assert_eq!(
            registry.keys_for_tag("promotions"),
            HashSet::from(["k1".to_string()])
        );
    }

    #[test]
    fn test_reregister_with_empty_tags_unregisters() {
        let registry = TagRegistry::new();
        registry.register("k1", &tags(&["products"]));
        registry.register("k1", &[]);

        assert!(registry.keys_for_tag("products").is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_removes_from_every_tag() {
        let registry = TagRegistry::new();
        registry.register("k1", &tags(&["products", "inventory"]));
        registry.register("k2", &tags(&["products"]));

        registry.unregister("k1");

        assert_eq!(
            registry.keys_for_tag("products"),
            HashSet::from(["k2".to_string()])
        );
        assert!(registry.keys_for_tag("inventory").is_empty());
        assert!(registry.tags_for_key("k1").is_empty());
    }

    #[test]
    fn test_unregister_unknown_key_is_noop() {
        let registry = TagRegistry::new();
        registry.register("k1", &tags(&["products"]));
        registry.unregister("ghost");
        assert_eq!(registry.key_count(), 1);
    }

    #[test]
    fn test_empty_tags_are_pruned() {
        let registry = TagRegistry::new();
        registry.register("k1", &tags(&["products"]));
        assert_eq!(registry.tag_count(), 1);

        registry.unregister("k1");
        assert_eq!(registry.tag_count(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_tag_isolation() {
        let registry = TagRegistry::new();
        registry.register("k1", &tags(&["roles"]));
        registry.register("k2", &tags(&["users"]));

        for key in registry.keys_for_tag("roles") {
            registry.unregister(&key);
        }

        assert!(registry.keys_for_tag("roles").is_empty());
        assert_eq!(
            registry.keys_for_tag("users"),
            HashSet::from(["k2".to_string()])
        );
    }

    #[test]
    fn test_snapshot_is_detached_from_registry() {
        let registry = TagRegistry::new();
        registry.register("k1", &tags(&["products"]));
        registry.register("k2", &tags(&["products"]));

        let snapshot = registry.keys_for_tag("products");
        registry.unregister("k1");

        // The snapshot still holds both keys; the registry does not.
        assert_eq!(snapshot.len(), 2);
        assert_eq!(registry.keys_for_tag("products").len(), 1);
    }

    #[test]
    fn test_debug_reports_counts() {
        let registry = TagRegistry::new();
        registry.register("k1", &tags(&["a", "b"]));
        let debug = format!("{:?}", registry);
        assert!(debug.contains("tag_count: 2"));
        assert!(debug.contains("key_count: 1"));
    }

    #[test]
    fn test_concurrent_register_unregister() {
        use std::sync::Arc;

        let registry = Arc::new(TagRegistry::new());
        let mut handles = Vec::new();

        for t in 0..4 {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    let key = format!("k{}-{}", t, i);
                    registry.register(&key, &[format!("tag{}", i % 5)]);
                    if i % 2 == 0 {
                        registry.unregister(&key);
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().expect("worker thread should not panic");
        }

        // Every odd-numbered key survived, every even-numbered was removed.
        assert_eq!(registry.key_count(), 4 * 50);
    }
}
