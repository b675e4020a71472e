//! TALLY Core - Shared Data Types
//!
//! Pure data structures with no behavior. All other crates depend on this.
//! This crate contains ONLY data types - no caching or query logic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod config;
pub mod error;

pub use config::CachingConfig;
pub use error::{CacheError, ConfigError, QueryError, TallyError, TallyResult};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Identifier for the user a request is executing on behalf of.
pub type UserId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

// ============================================================================
// REQUEST SCOPE
// ============================================================================

/// Ambient identity of the request being handled.
///
/// Supplied by the host application at request time and consumed by the
/// cache key builder when a query is user-scoped. A scope has no lifecycle
/// of its own: it is built per request and dropped with it.
///
/// Anonymous scopes (no user id) are valid; a user-scoped query executed
/// under an anonymous scope cannot derive a key and falls through to the
/// authoritative data source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeContext {
    /// The current user, if the request is authenticated.
    pub user_id: Option<UserId>,
}

impl ScopeContext {
    /// Scope for an unauthenticated request.
    pub fn anonymous() -> Self {
        Self { user_id: None }
    }

    /// Scope for a request executing on behalf of `user_id`.
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
        }
    }

    /// The current user identifier, if any.
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    /// Whether this scope carries a user identity.
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}
