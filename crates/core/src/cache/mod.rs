//! SQLite-backed response buckets for the asset cache.
//!
//! This module provides the persistent side of the asset cache:
//!
//! - Named buckets with independent lifecycles
//! - Upsert, lookup, enumeration and deletion of entries
//! - All-or-nothing bulk writes and bulk bucket deletion
//!
//! Fetch policies live with the asset cache manager; this layer only stores.

pub mod buckets;
pub mod connection;

pub use crate::Error;

pub use buckets::{AssetResponse, Bucket};
pub use connection::BucketDb;
