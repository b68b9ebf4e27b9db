//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_items` is 0
    /// - `reconnect_delay_ms` is less than 100ms
    /// - `eviction_interval_secs` or `frame_interval_ms` is 0
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent`, `cache_prefix` or `shell_manifest` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_items == 0 {
            return Err(invalid("max_items", "must be greater than 0"));
        }

        if self.reconnect_delay_ms < 100 {
            return Err(invalid("reconnect_delay_ms", "must be at least 100ms"));
        }

        if self.eviction_interval_secs == 0 {
            return Err(invalid("eviction_interval_secs", "must be greater than 0"));
        }

        if self.frame_interval_ms == 0 {
            return Err(invalid("frame_interval_ms", "must be greater than 0"));
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.cache_prefix.is_empty() {
            return Err(invalid("cache_prefix", "must not be empty"));
        }

        if self.shell_manifest.is_empty() {
            return Err(invalid("shell_manifest", "must list at least one asset"));
        }

        if !self.images_cache_name.starts_with(&self.cache_prefix) {
            tracing::warn!(
                images_cache_name = %self.images_cache_name,
                cache_prefix = %self.cache_prefix,
                "image bucket is outside the cache namespace; activation will never clean it up"
            );
        }

        Ok(())
    }
}
