//! Tiered asset cache: key normalization, bucket naming, serving
//! policies, worker lifecycle and reachability eviction.

pub mod eviction;
pub mod keys;
pub mod manager;
pub mod names;
pub mod worker;

pub use eviction::{clean_image_cache, spawn_eviction_loop};
pub use keys::{avatar_storage_key, photo_storage_key};
pub use manager::{AssetCacheManager, AssetRoute, route};
pub use names::CacheNames;
pub use worker::{ControlAction, ControlMessage, Worker, WorkerState};
