//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (WITTR_*)
//! 2. TOML config file (if WITTR_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (WITTR_*)
/// 2. TOML config file (if WITTR_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Whether persistent storage is available in this environment.
    ///
    /// Checked once at startup. When false every store-backed operation
    /// degrades to a no-op. Set via WITTR_STORAGE_ENABLED.
    #[serde(default = "default_true")]
    pub storage_enabled: bool,

    /// Path to the feed store database.
    ///
    /// Set via WITTR_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Schema version requested when opening the feed store.
    #[serde(default = "default_store_version")]
    pub store_version: u32,

    /// Path to the asset bucket database.
    ///
    /// Set via WITTR_CACHE_DB_PATH environment variable.
    #[serde(default = "default_cache_db_path")]
    pub cache_db_path: PathBuf,

    /// Maximum number of feed items retained after each live update.
    #[serde(default = "default_max_items")]
    pub max_items: usize,

    /// Origin the asset cache treats as same-origin.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Live-update channel endpoint.
    #[serde(default = "default_updates_url")]
    pub updates_url: String,

    /// Fixed delay before reconnecting a dropped channel, in milliseconds.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Period of the image reachability eviction, in seconds.
    #[serde(default = "default_eviction_interval_secs")]
    pub eviction_interval_secs: u64,

    /// Paint-opportunity granularity for inbound batches, in milliseconds.
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,

    /// Namespace prefix of buckets owned by this application.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Version suffix of the static shell bucket.
    #[serde(default = "default_static_cache_version")]
    pub static_cache_version: u32,

    /// Name of the content image bucket; stable across versions.
    #[serde(default = "default_images_cache_name")]
    pub images_cache_name: String,

    /// Shell assets installed into the static bucket.
    #[serde(default = "default_shell_manifest")]
    pub shell_manifest: Vec<String>,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via WITTR_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via WITTR_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes to fetch per asset.
    ///
    /// Set via WITTR_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

fn default_true() -> bool {
    true
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./wittr-feed.sqlite")
}

fn default_store_version() -> u32 {
    crate::store::CURRENT_VERSION
}

fn default_cache_db_path() -> PathBuf {
    PathBuf::from("./wittr-assets.sqlite")
}

fn default_max_items() -> usize {
    crate::reconcile::DEFAULT_MAX_ITEMS
}

fn default_origin() -> String {
    "http://localhost:8888".into()
}

fn default_updates_url() -> String {
    "ws://localhost:8888/updates".into()
}

fn default_reconnect_delay_ms() -> u64 {
    5_000
}

fn default_eviction_interval_secs() -> u64 {
    5 * 60
}

fn default_frame_interval_ms() -> u64 {
    16
}

fn default_cache_prefix() -> String {
    "wittr-".into()
}

fn default_static_cache_version() -> u32 {
    8
}

fn default_images_cache_name() -> String {
    "wittr-content-imgs".into()
}

fn default_shell_manifest() -> Vec<String> {
    vec![
        "/skeleton".into(),
        "js/main.js".into(),
        "css/main.css".into(),
        "imgs/icon.png".into(),
        "https://fonts.gstatic.com/s/roboto/v15/2UX7WLTfW3W8TclTUvlFyQ.woff".into(),
        "https://fonts.gstatic.com/s/roboto/v15/d-6IYplOFocCacKzxwXSOD8E0i7KZn-EPnyo3HZu7kw.woff".into(),
    ]
}

fn default_user_agent() -> String {
    "wittr-offline/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage_enabled: true,
            db_path: default_db_path(),
            store_version: default_store_version(),
            cache_db_path: default_cache_db_path(),
            max_items: default_max_items(),
            origin: default_origin(),
            updates_url: default_updates_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            eviction_interval_secs: default_eviction_interval_secs(),
            frame_interval_ms: default_frame_interval_ms(),
            cache_prefix: default_cache_prefix(),
            static_cache_version: default_static_cache_version(),
            images_cache_name: default_images_cache_name(),
            shell_manifest: default_shell_manifest(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    /// Name of the versioned static shell bucket, e.g. `wittr-static-v8`.
    pub fn static_cache_name(&self) -> String {
        format!("{}static-v{}", self.cache_prefix, self.static_cache_version)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `WITTR_`
    /// 2. TOML file from `WITTR_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("WITTR_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("WITTR_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
