//! Engine configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// What [`TopCache`](crate::cache::TopCache) does when the store fails while
/// filling a cache miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheFailurePolicy {
    /// Return the storage error to the caller.
    Propagate,
    /// Log a warning and return an empty list, leaving the slot uncached.
    #[default]
    DegradeToEmpty,
}

/// Tunables for the ranking engine.
///
/// Every field has a default, so a config file only needs to name the values
/// it overrides.
///
/// # Example
///
/// ```rust
/// use rankdrop::config::{CacheFailurePolicy, EngineConfig};
///
/// let config = EngineConfig::default()
///     .with_cache_depth(50)
///     .with_max_top_limit(50)
///     .with_cache_failure_policy(CacheFailurePolicy::Propagate);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of ranked rows kept per leaderboard in the top cache.
    pub cache_depth: usize,
    /// Behaviour on storage failure during a cache fill.
    pub cache_failure_policy: CacheFailurePolicy,
    /// Largest `limit` accepted by top-N requests at the API boundary.
    pub max_top_limit: usize,
    /// Largest page size for paginated listings; larger requests are clamped.
    pub max_page_size: usize,
    /// How often the reset scheduler checks for due leaderboards.
    pub reset_poll_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_depth: 100,
            cache_failure_policy: CacheFailurePolicy::DegradeToEmpty,
            max_top_limit: 100,
            max_page_size: 1000,
            reset_poll_interval_secs: 60,
        }
    }
}

impl EngineConfig {
    /// Loads a config file, or returns the defaults if `path` does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&data).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the top cache depth.
    #[must_use]
    pub fn with_cache_depth(mut self, depth: usize) -> Self {
        self.cache_depth = depth;
        self
    }

    /// Sets the cache failure policy.
    #[must_use]
    pub fn with_cache_failure_policy(mut self, policy: CacheFailurePolicy) -> Self {
        self.cache_failure_policy = policy;
        self
    }

    /// Sets the largest accepted top-N limit.
    #[must_use]
    pub fn with_max_top_limit(mut self, limit: usize) -> Self {
        self.max_top_limit = limit;
        self
    }

    /// Sets the largest page size.
    #[must_use]
    pub fn with_max_page_size(mut self, size: usize) -> Self {
        self.max_page_size = size;
        self
    }

    /// Returns the scheduler poll interval.
    pub fn reset_poll_interval(&self) -> Duration {
        Duration::from_secs(self.reset_poll_interval_secs)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a value is zero or the top-N limit
    /// exceeds what the cache can serve.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| ConfigError::Invalid { reason };

        if self.cache_depth == 0 {
            return Err(invalid("cache_depth must be greater than zero".to_string()).into());
        }
        if self.max_page_size == 0 {
            return Err(invalid("max_page_size must be greater than zero".to_string()).into());
        }
        if self.max_top_limit == 0 || self.max_top_limit > self.cache_depth {
            return Err(invalid(format!(
                "max_top_limit ({}) must be between 1 and cache_depth ({})",
                self.max_top_limit, self.cache_depth
            ))
            .into());
        }
        if self.reset_poll_interval_secs == 0 {
            return Err(invalid("reset_poll_interval_secs must be greater than zero".to_string()).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache_depth, 100);
        assert_eq!(config.cache_failure_policy, CacheFailurePolicy::DegradeToEmpty);
        assert_eq!(config.reset_poll_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(EngineConfig::default().with_cache_depth(0).validate().is_err());
        assert!(EngineConfig::default().with_max_page_size(0).validate().is_err());
        assert!(EngineConfig::default().with_max_top_limit(101).validate().is_err());
        assert!(EngineConfig::default().with_max_top_limit(0).validate().is_err());
    }

    #[test]
    fn test_load_partial_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("rankdrop.json");
        std::fs::write(&path, r#"{"cache_failure_policy":"propagate","max_page_size":50}"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.cache_failure_policy, CacheFailurePolicy::Propagate);
        assert_eq!(config.max_page_size, 50);
        assert_eq!(config.cache_depth, 100);
    }

    #[test]
    fn test_load_missing_and_invalid() {
        let temp_dir = tempdir().unwrap();
        assert_eq!(
            EngineConfig::load(temp_dir.path().join("absent.json")).unwrap(),
            EngineConfig::default()
        );

        let path = temp_dir.path().join("bad.json");
        std::fs::write(&path, r#"{"cache_depth":0}"#).unwrap();
        assert!(EngineConfig::load(&path).is_err());
    }
}
