//! Core types and storage for the wittr offline client.
//!
//! This crate provides:
//! - The durable feed store (versioned schema, scoped transactions, `by-date` cursors)
//! - Bounded retention and live-update reconciliation
//! - SQLite-backed response buckets for the asset cache
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
mod connection;
pub mod error;
pub mod migrations;
pub mod reconcile;
pub mod retention;
pub mod store;

pub use cache::{AssetResponse, Bucket, BucketDb};
pub use config::AppConfig;
pub use error::Error;
pub use reconcile::{PostsView, ReconcileOutcome, Reconciler};
pub use store::{FeedDb, FeedItem, Storage};
