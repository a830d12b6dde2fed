//! Runtime Configuration
//!
//! Each thread owns its own reactive runtime. A runtime copies the
//! process-wide default configuration the first time it is used on a thread;
//! [`crate::configure`] replaces the configuration of the current thread only.

use parking_lot::{const_rwlock, RwLock};
use serde::Deserialize;

use crate::error::{ReactiveError, Result};

/// Tunables for the reactive runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// How many nested runs of the same computation are allowed before the
    /// innermost run is aborted with a reentrancy diagnostic.
    pub max_reentrant_depth: u32,

    /// How many times a single computation may be re-queued within one
    /// flush before it is dropped.
    pub max_flush_reruns: u32,
}

impl RuntimeConfig {
    pub const DEFAULT_MAX_REENTRANT_DEPTH: u32 = 8;
    pub const DEFAULT_MAX_FLUSH_RERUNS: u32 = 100;

    /// Parse a configuration from JSON. Missing fields take their defaults.
    ///
    /// ```rust
    /// use ripple_core::RuntimeConfig;
    ///
    /// let config = RuntimeConfig::from_json_str(r#"{ "max_reentrant_depth": 4 }"#).unwrap();
    /// assert_eq!(config.max_reentrant_depth, 4);
    /// assert_eq!(config.max_flush_reruns, RuntimeConfig::DEFAULT_MAX_FLUSH_RERUNS);
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ReactiveError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject limits that would make every computation fail.
    pub fn validate(&self) -> Result<()> {
        if self.max_reentrant_depth == 0 {
            return Err(ReactiveError::Config(
                "max_reentrant_depth must be at least 1".into(),
            ));
        }
        if self.max_flush_reruns == 0 {
            return Err(ReactiveError::Config(
                "max_flush_reruns must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_reentrant_depth: Self::DEFAULT_MAX_REENTRANT_DEPTH,
            max_flush_reruns: Self::DEFAULT_MAX_FLUSH_RERUNS,
        }
    }
}

static DEFAULT_CONFIG: RwLock<RuntimeConfig> = const_rwlock(RuntimeConfig {
    max_reentrant_depth: RuntimeConfig::DEFAULT_MAX_REENTRANT_DEPTH,
    max_flush_reruns: RuntimeConfig::DEFAULT_MAX_FLUSH_RERUNS,
});

/// The configuration new thread runtimes start from.
pub fn default_config() -> RuntimeConfig {
    *DEFAULT_CONFIG.read()
}

/// Replace the process-wide default. Runtimes that already exist keep their
/// current configuration.
pub fn set_default(config: RuntimeConfig) -> Result<()> {
    config.validate()?;
    *DEFAULT_CONFIG.write() = config;
    Ok(())
}
