//! Cache configuration for user-configurable limits.
//!
//! Central knobs for the image cache and the memory budget. Configuration can
//! be created programmatically with the builder methods or picked up from
//! environment variables.

use std::time::Duration;

/// Configuration error raised for malformed overrides.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}")]
    InvalidValue(String),
}

/// Limits for the cache and the memory budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheConfig {
    /// Maximum number of cached decoded images.
    pub max_entries: usize,

    /// Aggregate cache cost limit in bytes.
    pub max_cost_bytes: u64,

    /// Memory budget ceiling in bytes.
    pub max_memory_bytes: u64,

    /// Automatic pressure recovery delay; `None` disables it.
    pub pressure_recovery: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 200,
            max_cost_bytes: 256 * 1024 * 1024,  // 256 MB
            max_memory_bytes: 512 * 1024 * 1024, // 512 MB
            pressure_recovery: Some(Duration::from_secs(60)),
        }
    }
}

impl CacheConfig {
    /// Sets the entry-count limit.
    pub fn with_max_entries(mut self, entries: usize) -> Self {
        self.max_entries = entries;
        self
    }

    /// Sets the cache cost limit in megabytes.
    pub fn with_cache_mb(mut self, mb: u64) -> Self {
        self.max_cost_bytes = mb * 1024 * 1024;
        self
    }

    /// Sets the memory budget ceiling in megabytes.
    pub fn with_memory_budget_mb(mut self, mb: u64) -> Self {
        self.max_memory_bytes = mb * 1024 * 1024;
        self
    }

    /// Sets or disables the automatic pressure recovery delay.
    pub fn with_pressure_recovery(mut self, recovery: Option<Duration>) -> Self {
        self.pressure_recovery = recovery;
        self
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `LIGHTBOX_CACHE_ENTRIES`: entry-count limit (default: 200)
    /// - `LIGHTBOX_CACHE_MB`: cache cost limit in MB (default: 256)
    /// - `LIGHTBOX_MEMORY_BUDGET_MB`: budget ceiling in MB (default: 512)
    /// - `LIGHTBOX_PRESSURE_RECOVERY_SECS`: recovery delay in seconds,
    ///   `0` disables automatic recovery (default: 60)
    ///
    /// # Errors
    /// Returns an error if any variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("LIGHTBOX_CACHE_ENTRIES") {
            config.max_entries = val
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidValue("LIGHTBOX_CACHE_ENTRIES".to_string()))?;
        }

        if let Ok(val) = std::env::var("LIGHTBOX_CACHE_MB") {
            config.max_cost_bytes = val
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue("LIGHTBOX_CACHE_MB".to_string()))?
                * 1024
                * 1024;
        }

        if let Ok(val) = std::env::var("LIGHTBOX_MEMORY_BUDGET_MB") {
            config.max_memory_bytes = val
                .parse::<u64>()
                .map_err(|_| {
                    ConfigError::InvalidValue("LIGHTBOX_MEMORY_BUDGET_MB".to_string())
                })?
                * 1024
                * 1024;
        }

        if let Ok(val) = std::env::var("LIGHTBOX_PRESSURE_RECOVERY_SECS") {
            let secs = val.parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue("LIGHTBOX_PRESSURE_RECOVERY_SECS".to_string())
            })?;
            config.pressure_recovery = if secs == 0 {
                None
            } else {
                Some(Duration::from_secs(secs))
            };
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        std::env::remove_var("LIGHTBOX_CACHE_ENTRIES");
        std::env::remove_var("LIGHTBOX_CACHE_MB");
        std::env::remove_var("LIGHTBOX_MEMORY_BUDGET_MB");
        std::env::remove_var("LIGHTBOX_PRESSURE_RECOVERY_SECS");
    }

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.max_entries, 200);
        assert_eq!(config.max_cost_bytes, 256 * 1024 * 1024);
        assert_eq!(config.max_memory_bytes, 512 * 1024 * 1024);
        assert_eq!(config.pressure_recovery, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_builders() {
        let config = CacheConfig::default()
            .with_max_entries(50)
            .with_cache_mb(64)
            .with_memory_budget_mb(128)
            .with_pressure_recovery(None);

        assert_eq!(config.max_entries, 50);
        assert_eq!(config.max_cost_bytes, 64 * 1024 * 1024);
        assert_eq!(config.max_memory_bytes, 128 * 1024 * 1024);
        assert_eq!(config.pressure_recovery, None);
    }

    #[test]
    #[serial]
    fn test_from_env_defaults_when_unset() {
        clear_env();
        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        std::env::set_var("LIGHTBOX_CACHE_ENTRIES", "33");
        std::env::set_var("LIGHTBOX_CACHE_MB", "10");
        std::env::set_var("LIGHTBOX_MEMORY_BUDGET_MB", "20");
        std::env::set_var("LIGHTBOX_PRESSURE_RECOVERY_SECS", "0");

        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config.max_entries, 33);
        assert_eq!(config.max_cost_bytes, 10 * 1024 * 1024);
        assert_eq!(config.max_memory_bytes, 20 * 1024 * 1024);
        assert_eq!(config.pressure_recovery, None);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_value() {
        clear_env();
        std::env::set_var("LIGHTBOX_CACHE_MB", "lots");

        let err = CacheConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref var) if var == "LIGHTBOX_CACHE_MB"));

        clear_env();
    }
}
