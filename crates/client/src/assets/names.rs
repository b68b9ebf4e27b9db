//! Bucket naming.
//!
//! The static shell bucket carries a version suffix and is replaced
//! wholesale on every bump; the image bucket keeps one name forever.
//! Only names under the application's prefix are ever considered stale.

use wittr_core::AppConfig;

/// The set of bucket names the current worker version owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
    pub prefix: String,
    pub static_name: String,
    pub images_name: String,
}

impl CacheNames {
    pub fn new(prefix: impl Into<String>, static_version: u32, images_name: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let static_name = format!("{prefix}static-v{static_version}");
        Self { prefix, static_name, images_name: images_name.into() }
    }

    /// Buckets that survive activation.
    pub fn allowed(&self) -> [&str; 2] {
        [&self.static_name, &self.images_name]
    }

    /// Existing buckets activation should delete, in the order given.
    pub fn stale<'a>(&self, existing: &'a [String]) -> Vec<&'a str> {
        stale_buckets(existing, &self.prefix, &self.allowed())
    }
}

impl From<&AppConfig> for CacheNames {
    fn from(config: &AppConfig) -> Self {
        Self {
            prefix: config.cache_prefix.clone(),
            static_name: config.static_cache_name(),
            images_name: config.images_cache_name.clone(),
        }
    }
}

/// Names in `existing` that carry `prefix` but are not in `allowed`.
pub fn stale_buckets<'a>(existing: &'a [String], prefix: &str, allowed: &[&str]) -> Vec<&'a str> {
    existing
        .iter()
        .map(String::as_str)
        .filter(|name| name.starts_with(prefix) && !allowed.contains(name))
        .collect()
}
