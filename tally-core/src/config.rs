//! Configuration types

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Process-wide caching configuration.
///
/// Read once at startup and never mutated afterwards; every component holds
/// an immutable copy. A disabled configuration degrades the whole cache to a
/// pass-through that is indistinguishable, correctness-wise, from having no
/// cache at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachingConfig {
    /// Master switch. When false every read misses and every write is
    /// silently dropped.
    pub enabled: bool,

    /// Sliding expiration applied when a query declares none.
    pub default_sliding: Duration,

    /// Absolute expiration applied when a query declares none.
    pub default_absolute: Duration,

    /// Total memory budget for cached payloads, in megabytes.
    pub memory_limit_mb: u64,

    /// Largest single entry the store accepts, in kilobytes. Oversized
    /// entries are rejected, never stored.
    pub max_entry_size_kb: u64,

    /// Fraction of the memory budget freed when the limit is exceeded.
    /// Compaction evicts least-recently-used entries until usage falls to
    /// `(1 - compaction_fraction) * memory_limit`.
    pub compaction_fraction: f64,

    /// Whether a cache hit renews the entry's sliding-expiration window.
    /// With this off, sliding expiration measures from the last write.
    pub refresh_sliding_on_read: bool,
}

impl Default for CachingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_sliding: Duration::from_secs(120),
            default_absolute: Duration::from_secs(3600),
            memory_limit_mb: 256,
            max_entry_size_kb: 1024,
            compaction_fraction: 0.1,
            refresh_sliding_on_read: true,
        }
    }
}

impl CachingConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a disabled configuration (pure pass-through).
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Set the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the default sliding expiration.
    pub fn with_default_sliding(mut self, duration: Duration) -> Self {
        self.default_sliding = duration;
        self
    }

    /// Set the default absolute expiration.
    pub fn with_default_absolute(mut self, duration: Duration) -> Self {
        self.default_absolute = duration;
        self
    }

    /// Set the memory budget in megabytes.
    pub fn with_memory_limit_mb(mut self, mb: u64) -> Self {
        self.memory_limit_mb = mb;
        self
    }

    /// Set the single-entry size cap in kilobytes.
    pub fn with_max_entry_size_kb(mut self, kb: u64) -> Self {
        self.max_entry_size_kb = kb;
        self
    }

    /// Set the compaction fraction (0, 1].
    pub fn with_compaction_fraction(mut self, fraction: f64) -> Self {
        self.compaction_fraction = fraction;
        self
    }

    /// Set whether reads renew the sliding-expiration window.
    pub fn with_refresh_sliding_on_read(mut self, refresh: bool) -> Self {
        self.refresh_sliding_on_read = refresh;
        self
    }

    /// Memory budget in bytes.
    pub fn memory_limit_bytes(&self) -> u64 {
        self.memory_limit_mb * 1024 * 1024
    }

    /// Single-entry size cap in bytes.
    pub fn max_entry_size_bytes(&self) -> u64 {
        self.max_entry_size_kb * 1024
    }

    /// Usage target after a compaction pass, in bytes.
    pub fn compaction_target_bytes(&self) -> u64 {
        ((1.0 - self.compaction_fraction) * self.memory_limit_bytes() as f64) as u64
    }

    /// Validate the configuration.
    ///
    /// Called once by the orchestrator at construction; an invalid config
    /// never reaches the store.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_limit_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "memory_limit_mb".to_string(),
                value: "0".to_string(),
                reason: "memory budget must be nonzero".to_string(),
            });
        }
        if !(self.compaction_fraction > 0.0 && self.compaction_fraction <= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "compaction_fraction".to_string(),
                value: self.compaction_fraction.to_string(),
                reason: "must be within (0, 1]".to_string(),
            });
        }
        if self.max_entry_size_bytes() > self.memory_limit_bytes() {
            return Err(ConfigError::IncompatibleOptions {
                option_a: "max_entry_size_kb".to_string(),
                option_b: "memory_limit_mb".to_string(),
            });
        }
        Ok(())
    }
}
