//! Scoped transactions over the two fixed collections.
//!
//! A transaction runs as a closure on the connection thread. Returning `Ok`
//! commits every write made through it; returning `Err` (or panicking) drops
//! the underlying SQLite transaction, which rolls everything back.

use super::cursor::DateIndex;
use super::item::FeedItem;
use crate::Error;
use serde::{Serialize, de::DeserializeOwned};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, Connection, OptionalExtension};

/// The fixed logical collections of the feed store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Feed items keyed by `id`, indexed `by-date`.
    Feed,
    /// Generic key/value entries.
    KeyValue,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::Feed => "wittrs",
            Collection::KeyValue => "keyval",
        }
    }
}

/// Transaction access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    Read,
    ReadWrite,
}

/// Handle passed to a transaction closure.
pub struct StoreTransaction<'t> {
    conn: &'t Connection,
    scope: &'t [Collection],
    mode: TxMode,
}

impl<'t> StoreTransaction<'t> {
    pub(crate) fn new(conn: &'t Connection, scope: &'t [Collection], mode: TxMode) -> Self {
        Self { conn, scope, mode }
    }

    pub fn mode(&self) -> TxMode {
        self.mode
    }

    fn check_scope(&self, collection: Collection) -> Result<(), Error> {
        if self.scope.contains(&collection) { Ok(()) } else { Err(Error::NotInScope(collection.name())) }
    }

    /// The feed collection, if it was declared in this transaction's scope.
    pub fn feed(&self) -> Result<FeedStore<'t>, Error> {
        self.check_scope(Collection::Feed)?;
        Ok(FeedStore { conn: self.conn, mode: self.mode })
    }

    /// The key/value collection, if it was declared in this transaction's scope.
    pub fn key_values(&self) -> Result<KeyValueStore<'t>, Error> {
        self.check_scope(Collection::KeyValue)?;
        Ok(KeyValueStore { conn: self.conn, mode: self.mode })
    }
}

pub(crate) fn require_write(mode: TxMode, collection: Collection) -> Result<(), Error> {
    match mode {
        TxMode::ReadWrite => Ok(()),
        TxMode::Read => Err(Error::ReadOnlyTransaction(collection.name())),
    }
}

pub(crate) fn decode_item(body: &str) -> Result<FeedItem, Error> {
    serde_json::from_str(body).map_err(Error::from)
}

/// Feed collection handle within a transaction.
#[derive(Clone, Copy)]
pub struct FeedStore<'t> {
    pub(crate) conn: &'t Connection,
    pub(crate) mode: TxMode,
}

impl<'t> FeedStore<'t> {
    /// Fetch an item by id.
    pub fn get(&self, id: &str) -> Result<Option<FeedItem>, Error> {
        let body: Option<String> = self
            .conn
            .query_row("SELECT body FROM wittrs WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        body.as_deref().map(decode_item).transpose()
    }

    /// All items in primary-key order.
    pub fn get_all(&self) -> Result<Vec<FeedItem>, Error> {
        let mut stmt = self.conn.prepare("SELECT body FROM wittrs ORDER BY id ASC")?;
        let bodies = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, rusqlite::Error>>()?;
        bodies.iter().map(|b| decode_item(b)).collect()
    }

    /// Insert or replace an item by id.
    pub fn put(&self, item: &FeedItem) -> Result<(), Error> {
        require_write(self.mode, Collection::Feed)?;
        let body = serde_json::to_string(item)?;
        self.conn.execute(
            "INSERT INTO wittrs (id, time, body) VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                time = excluded.time,
                body = excluded.body",
            params![&item.id, item.time_key(), body],
        )?;
        Ok(())
    }

    /// Delete an item by id. Returns whether a record was removed.
    pub fn delete(&self, id: &str) -> Result<bool, Error> {
        require_write(self.mode, Collection::Feed)?;
        let count = self.conn.execute("DELETE FROM wittrs WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }

    pub fn count(&self) -> Result<u64, Error> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM wittrs", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// The `by-date` secondary index on `time`.
    pub fn by_date(&self) -> DateIndex<'t> {
        DateIndex { store: *self }
    }
}

/// Key/value collection handle within a transaction.
#[derive(Clone, Copy)]
pub struct KeyValueStore<'t> {
    conn: &'t Connection,
    mode: TxMode,
}

impl KeyValueStore<'_> {
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, Error> {
        let value: Option<String> = self
            .conn
            .query_row("SELECT value FROM keyval WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        value.map(|v| serde_json::from_str(&v).map_err(Error::from)).transpose()
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), Error> {
        require_write(self.mode, Collection::KeyValue)?;
        let value = serde_json::to_string(value)?;
        self.conn.execute(
            "INSERT INTO keyval (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<bool, Error> {
        require_write(self.mode, Collection::KeyValue)?;
        let count = self.conn.execute("DELETE FROM keyval WHERE key = ?1", params![key])?;
        Ok(count > 0)
    }

    /// All keys in ascending order.
    pub fn keys(&self) -> Result<Vec<String>, Error> {
        let mut stmt = self.conn.prepare("SELECT key FROM keyval ORDER BY key ASC")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, rusqlite::Error>>()?;
        Ok(keys)
    }
}
