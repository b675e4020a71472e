//! Scoped cache key derivation.
//!
//! The key insight is that `QueryKey`'s private inner string makes
//! unscoped construction of a user-scoped key UNCOMPILABLE: the scoped
//! constructor cannot be called without a user id, so a scoped query can
//! never silently share entries across users.

use serde::Serialize;
use tally_core::{CacheError, ScopeContext, UserId};

/// Separator between the key segments.
const SEGMENT_SEPARATOR: char = ':';

/// Marker preceding the user segment of a scoped key.
const SCOPE_MARKER: &str = ":u:";

/// A derived cache key for a query result.
///
/// # Design
///
/// The inner string is private: a `QueryKey` can ONLY be produced by the
/// constructors below, which fix the format and the scoping rules. The key
/// is a pure function of its inputs - no hidden state feeds it.
///
/// # Format
///
/// - shared: `{feature}:{canonical_payload}`
/// - scoped: `{feature}:{canonical_payload}:u:{user_id}`
///
/// The payload segment is the query serialized through `serde_json::Value`,
/// whose object maps are BTreeMap-backed: object keys serialize sorted at
/// every nesting level, so two structurally-equal payloads built in
/// different field orders always yield the same key. Two different users
/// issuing the same unscoped query intentionally collide on one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    /// Private inner key - cannot be constructed externally.
    inner: String,
}

impl QueryKey {
    /// Derive a key shared by every user issuing this query.
    pub fn shared<P: Serialize>(feature_key: &str, payload: &P) -> Result<Self, CacheError> {
        let canonical = canonical_payload(feature_key, payload)?;
        Ok(Self {
            inner: format!("{}{}{}", feature_key, SEGMENT_SEPARATOR, canonical),
        })
    }

    /// Derive a key private to `user_id`.
    ///
    /// This is the ONLY way to build a user-scoped key, ensuring scoped
    /// entries are isolated per user by construction.
    pub fn scoped<P: Serialize>(
        feature_key: &str,
        payload: &P,
        user_id: UserId,
    ) -> Result<Self, CacheError> {
        let canonical = canonical_payload(feature_key, payload)?;
        Ok(Self {
            inner: format!(
                "{}{}{}{}{}",
                feature_key, SEGMENT_SEPARATOR, canonical, SCOPE_MARKER, user_id
            ),
        })
    }

    /// Derive the key for a query under the given request scope.
    ///
    /// Routes to [`QueryKey::scoped`] when `user_scoped` is set, taking the
    /// user from the scope. A user-scoped query under an anonymous scope
    /// has no derivable key and yields [`CacheError::MissingScope`], which
    /// the orchestrator treats as a cache bypass for that request.
    pub fn for_query<P: Serialize>(
        feature_key: &str,
        payload: &P,
        user_scoped: bool,
        scope: &ScopeContext,
    ) -> Result<Self, CacheError> {
        if user_scoped {
            match scope.user_id() {
                Some(user_id) => Self::scoped(feature_key, payload, user_id),
                None => Err(CacheError::MissingScope {
                    feature: feature_key.to_string(),
                }),
            }
        } else {
            Self::shared(feature_key, payload)
        }
    }

    /// The derived key string.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Whether this key carries a user segment.
    pub fn is_scoped(&self) -> bool {
        self.inner.contains(SCOPE_MARKER)
    }
}

impl AsRef<str> for QueryKey {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.inner)
    }
}

/// Canonicalize the payload: serialize through `serde_json::Value` so that
/// object keys come out sorted regardless of declaration or insertion order.
fn canonical_payload<P: Serialize>(feature_key: &str, payload: &P) -> Result<String, CacheError> {
    let value = serde_json::to_value(payload).map_err(|e| CacheError::KeySerialization {
        feature: feature_key.to_string(),
        reason: e.to_string(),
    })?;
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_shared_key_format() {
        let key = QueryKey::shared("catalog.product", &json!({"sku": "A-100"}))
            .expect("key derivation should succeed");
        assert_eq!(key.as_str(), r#"catalog.product:{"sku":"A-100"}"#);
        assert!(!key.is_scoped());
    }

    #[test]
    fn test_scoped_key_appends_user_segment() {
        let user = Uuid::nil();
        let key = QueryKey::scoped("orders.history", &json!({"page": 1}), user)
            .expect("key derivation should succeed");
        assert!(key.as_str().starts_with(r#"orders.history:{"page":1}"#));
        assert!(key.as_str().ends_with(&user.to_string()));
        assert!(key.is_scoped());
    }

    #[test]
    fn test_field_order_does_not_change_key() {
        let a = json!({"customer": 7, "status": "open", "page": 2});
        let b = json!({"page": 2, "customer": 7, "status": "open"});

        let key_a = QueryKey::shared("orders.search", &a).expect("key derivation should succeed");
        let key_b = QueryKey::shared("orders.search", &b).expect("key derivation should succeed");
        assert_eq!(key_a, key_b);
    }

    #[test]
    fn test_nested_field_order_does_not_change_key() {
        let a = json!({"filter": {"min": 1, "max": 9}, "sort": "asc"});
        let b = json!({"sort": "asc", "filter": {"max": 9, "min": 1}});

        let key_a = QueryKey::shared("inventory.levels", &a).expect("key derivation should succeed");
        let key_b = QueryKey::shared("inventory.levels", &b).expect("key derivation should succeed");
        assert_eq!(key_a, key_b);
    }

    #[test]
    fn test_distinct_users_distinct_keys() {
        let payload = json!({"page": 1});
        let key_a = QueryKey::scoped("orders.history", &payload, Uuid::from_u128(1))
            .expect("key derivation should succeed");
        let key_b = QueryKey::scoped("orders.history", &payload, Uuid::from_u128(2))
            .expect("key derivation should succeed");
        assert_ne!(key_a, key_b);
    }

    #[test]
    fn test_unscoped_query_shares_key_across_users() {
        let payload = json!({"category": "tools"});
        let scope_a = ScopeContext::for_user(Uuid::from_u128(1));
        let scope_b = ScopeContext::for_user(Uuid::from_u128(2));

        let key_a = QueryKey::for_query("catalog.list", &payload, false, &scope_a)
            .expect("key derivation should succeed");
        let key_b = QueryKey::for_query("catalog.list", &payload, false, &scope_b)
            .expect("key derivation should succeed");
        assert_eq!(key_a, key_b);
    }

    #[test]
    fn test_scoped_query_without_user_is_missing_scope() {
        let payload = json!({"page": 1});
        let err = QueryKey::for_query("orders.history", &payload, true, &ScopeContext::anonymous())
            .expect_err("anonymous scope should not derive a scoped key");
        assert_eq!(
            err,
            CacheError::MissingScope {
                feature: "orders.history".to_string()
            }
        );
    }

    #[test]
    fn test_serialization_failure_is_reported_not_panicked() {
        struct Refusing;

        impl Serialize for Refusing {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(S::Error::custom("refused"))
            }
        }

        let err = QueryKey::shared("broken.feature", &Refusing)
            .expect_err("serialization failure should surface as an error");
        assert!(matches!(err, CacheError::KeySerialization { feature, .. } if feature == "broken.feature"));
    }

    #[test]
    fn test_different_features_different_keys() {
        let payload = json!({"id": 1});
        let key_a = QueryKey::shared("orders.by_id", &payload).expect("key derivation should succeed");
        let key_b = QueryKey::shared("invoices.by_id", &payload).expect("key derivation should succeed");
        assert_ne!(key_a, key_b);
    }
}
