//! Error types for TALLY cache operations

use thiserror::Error;

/// Cache-layer errors.
///
/// None of these abort a request: the orchestrator degrades every variant
/// into a cache bypass for the affected request and logs it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Key serialization failed for feature '{feature}': {reason}")]
    KeySerialization { feature: String, reason: String },

    #[error("Feature '{feature}' is user-scoped but the request scope has no user")]
    MissingScope { feature: String },

    #[error("Value serialization failed for key '{key}': {reason}")]
    ValueSerialization { key: String, reason: String },

    #[error("Value deserialization failed for key '{key}': {reason}")]
    ValueDeserialization { key: String, reason: String },
}

/// Errors surfaced by the authoritative data source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Query execution failed for feature '{feature}': {reason}")]
    ExecutionFailed { feature: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Incompatible options: {option_a} and {option_b}")]
    IncompatibleOptions { option_a: String, option_b: String },
}

/// Master error type for all TALLY errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TallyError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for TALLY operations.
pub type TallyResult<T> = Result<T, TallyError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_error_display_key_serialization() {
        let err = CacheError::KeySerialization {
            feature: "orders.by_customer".to_string(),
            reason: "float must be finite".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Key serialization failed"));
        assert!(msg.contains("orders.by_customer"));
        assert!(msg.contains("float must be finite"));
    }

    #[test]
    fn test_cache_error_display_missing_scope() {
        let err = CacheError::MissingScope {
            feature: "payments.history".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("user-scoped"));
        assert!(msg.contains("payments.history"));
    }

    #[test]
    fn test_query_error_display_execution_failed() {
        let err = QueryError::ExecutionFailed {
            feature: "inventory.levels".to_string(),
            reason: "connection reset".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Query execution failed"));
        assert!(msg.contains("inventory.levels"));
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "compaction_fraction".to_string(),
            value: "1.5".to_string(),
            reason: "must be within (0, 1]".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("compaction_fraction"));
        assert!(msg.contains("1.5"));
        assert!(msg.contains("must be within (0, 1]"));
    }

    #[test]
    fn test_tally_error_from_variants() {
        let cache = TallyError::from(CacheError::MissingScope {
            feature: "x".to_string(),
        });
        assert!(matches!(cache, TallyError::Cache(_)));

        let query = TallyError::from(QueryError::ExecutionFailed {
            feature: "x".to_string(),
            reason: "y".to_string(),
        });
        assert!(matches!(query, TallyError::Query(_)));

        let config = TallyError::from(ConfigError::MissingRequired {
            field: "memory_limit_mb".to_string(),
        });
        assert!(matches!(config, TallyError::Config(_)));
    }
}
