//! Durable feed store.
//!
//! A versioned, transactional SQLite store with exactly two collections:
//!
//! - `wittrs`: feed items keyed by `id`, with the `by-date` index on `time`
//! - `keyval`: generic key/value entries keyed per call
//!
//! Access goes through [`FeedDb::transaction`], which runs a closure against
//! a scoped [`StoreTransaction`] on the connection thread and commits only if
//! the closure succeeds. Whether storage exists at all is decided once at
//! startup by [`Storage::open`].

pub mod cursor;
pub mod item;
pub mod transaction;

pub use cursor::{Cursor, DateIndex, Direction, TimeRange};
pub use item::{FeedItem, parse_batch};
pub use transaction::{Collection, FeedStore, KeyValueStore, StoreTransaction, TxMode};

#[cfg(test)]
pub(crate) use item::fixtures;

use crate::config::AppConfig;
use crate::migrations::{self, Migration};
use crate::{Error, connection};
use serde::{Serialize, de::DeserializeOwned};
use std::path::Path;
use tokio_rusqlite::Connection;
use tokio_rusqlite::rusqlite::TransactionBehavior;

/// Schema steps for the feed store.
pub const STORE_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "feed items with by-date index",
        sql: include_str!("../../migrations/store/001_feed_items.sql"),
    },
    Migration {
        version: 2,
        description: "generic key/value collection",
        sql: include_str!("../../migrations/store/002_keyval.sql"),
    },
];

/// Schema version this build knows how to create.
pub const CURRENT_VERSION: u32 = 2;

/// Feed store handle.
///
/// Cheap to clone; every clone shares the same connection thread.
#[derive(Clone, Debug)]
pub struct FeedDb {
    conn: Connection,
    version: u32,
}

impl FeedDb {
    /// Open the store at `path`, upgrading its schema to `version`.
    ///
    /// # Errors
    ///
    /// Fails if the file can't be opened, a migration step fails, or the
    /// stored schema is newer than `version`.
    pub async fn open(path: impl AsRef<Path>, version: u32) -> Result<Self, Error> {
        let conn = connection::open(path).await?;
        Self::upgrade(conn, version).await
    }

    /// Open an in-memory store at the current schema version.
    pub async fn open_in_memory() -> Result<Self, Error> {
        Self::open_in_memory_at(CURRENT_VERSION).await
    }

    /// Open an in-memory store at a specific schema version.
    pub async fn open_in_memory_at(version: u32) -> Result<Self, Error> {
        let conn = connection::open_in_memory().await?;
        Self::upgrade(conn, version).await
    }

    async fn upgrade(conn: Connection, version: u32) -> Result<Self, Error> {
        let from = migrations::run(&conn, STORE_MIGRATIONS, version).await?;
        if from != version {
            tracing::info!(from, to = version, "upgraded feed store schema");
        }
        Ok(Self { conn, version })
    }

    /// Re-run the schema upgrade for the version this handle was opened at.
    pub async fn reupgrade(&self) -> Result<(), Error> {
        migrations::run(&self.conn, STORE_MIGRATIONS, self.version).await?;
        Ok(())
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Run `f` inside a transaction scoped to `scope`.
    ///
    /// Writes become visible to other transactions only after `f` returns
    /// `Ok` and the commit succeeds. An `Err` from `f` aborts every write made
    /// within it and is returned unchanged.
    pub async fn transaction<F, R>(&self, scope: &[Collection], mode: TxMode, f: F) -> Result<R, Error>
    where
        F: FnOnce(&StoreTransaction<'_>) -> Result<R, Error> + Send + 'static,
        R: Send + 'static,
    {
        let scope = scope.to_vec();
        self.conn
            .call(move |conn| -> Result<R, Error> {
                let behavior = match mode {
                    TxMode::Read => TransactionBehavior::Deferred,
                    TxMode::ReadWrite => TransactionBehavior::Immediate,
                };
                let tx = conn.transaction_with_behavior(behavior)?;
                let out = {
                    let store_tx = StoreTransaction::new(&tx, &scope, mode);
                    f(&store_tx)?
                };
                tx.commit()?;
                Ok(out)
            })
            .await
            .map_err(Error::from)
    }

    /// Upsert a batch of items in one transaction.
    pub async fn put_items(&self, items: Vec<FeedItem>) -> Result<(), Error> {
        self.transaction(&[Collection::Feed], TxMode::ReadWrite, move |tx| {
            let feed = tx.feed()?;
            items.iter().try_for_each(|item| feed.put(item))
        })
        .await
    }

    /// All items in primary-key order.
    pub async fn all_items(&self) -> Result<Vec<FeedItem>, Error> {
        self.transaction(&[Collection::Feed], TxMode::Read, |tx| tx.feed()?.get_all())
            .await
    }

    /// Cached history for display: read ascending through `by-date`, then
    /// reversed so the newest item comes first.
    pub async fn newest_first(&self) -> Result<Vec<FeedItem>, Error> {
        let mut items = self
            .transaction(&[Collection::Feed], TxMode::Read, |tx| tx.feed()?.by_date().get_all())
            .await?;
        items.reverse();
        Ok(items)
    }

    /// Trim the feed to `max_items` in its own transaction.
    pub async fn trim(&self, max_items: usize) -> Result<u64, Error> {
        self.transaction(&[Collection::Feed], TxMode::ReadWrite, move |tx| {
            crate::retention::trim(&tx.feed()?, max_items)
        })
        .await
    }

    pub async fn kv_get<T>(&self, key: &str) -> Result<Option<T>, Error>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let key = key.to_string();
        self.transaction(&[Collection::KeyValue], TxMode::Read, move |tx| tx.key_values()?.get(&key))
            .await
    }

    pub async fn kv_put<T>(&self, key: &str, value: T) -> Result<(), Error>
    where
        T: Serialize + Send + 'static,
    {
        let key = key.to_string();
        self.transaction(&[Collection::KeyValue], TxMode::ReadWrite, move |tx| tx.key_values()?.put(&key, &value))
            .await
    }
}

/// Persistent-storage capability, resolved once at startup.
#[derive(Clone, Debug)]
pub enum Storage {
    Available(FeedDb),
    Unsupported,
}

impl Storage {
    /// Open the feed store when the environment supports it.
    ///
    /// # Errors
    ///
    /// Errors opening an enabled store are returned; a disabled store is not
    /// an error.
    pub async fn open(config: &AppConfig) -> Result<Self, Error> {
        if !config.storage_enabled {
            tracing::info!("persistent storage unsupported; running without a feed store");
            return Ok(Storage::Unsupported);
        }
        let db = FeedDb::open(&config.db_path, config.store_version).await?;
        Ok(Storage::Available(db))
    }

    pub fn db(&self) -> Option<&FeedDb> {
        match self {
            Storage::Available(db) => Some(db),
            Storage::Unsupported => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Storage::Available(_))
    }

    /// Newest-first history, or nothing when storage is unsupported.
    pub async fn newest_first(&self) -> Result<Vec<FeedItem>, Error> {
        match self.db() {
            Some(db) => db.newest_first().await,
            None => Ok(Vec::new()),
        }
    }

    /// Every stored item, or nothing when storage is unsupported.
    pub async fn all_items(&self) -> Result<Vec<FeedItem>, Error> {
        match self.db() {
            Some(db) => db.all_items().await,
            None => Ok(Vec::new()),
        }
    }
}

impl From<FeedDb> for Storage {
    fn from(db: FeedDb) -> Self {
        Storage::Available(db)
    }
}
