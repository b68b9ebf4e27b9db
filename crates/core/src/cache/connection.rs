//! Bucket database handle.
//!
//! Opens the asset bucket database and brings its schema up to date.

use crate::migrations::{self, Migration};
use crate::{Error, connection};
use std::path::Path;
use tokio_rusqlite::Connection;

/// Schema steps for the bucket database.
pub const BUCKET_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "cache buckets and entries",
    sql: include_str!("../../migrations/buckets/001_cache_buckets.sql"),
}];

/// Bucket database handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread. Cheap to clone.
#[derive(Clone, Debug)]
pub struct BucketDb {
    pub(crate) conn: Connection,
}

impl BucketDb {
    /// Open a database at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies performance pragmas,
    /// and runs any pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = connection::open(path).await?;
        migrations::run(&conn, BUCKET_MIGRATIONS, migrations::latest(BUCKET_MIGRATIONS)).await?;
        Ok(Self { conn })
    }

    /// Open an in-memory database for testing.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = connection::open_in_memory().await?;
        migrations::run(&conn, BUCKET_MIGRATIONS, migrations::latest(BUCKET_MIGRATIONS)).await?;
        Ok(Self { conn })
    }
}
