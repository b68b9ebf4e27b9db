//! The `by-date` index and its cursors.
//!
//! Index order is `(time, id)`, so records sharing a timestamp are visited in
//! primary-key order in both directions. A cursor remembers the `(time, id)`
//! of the record it points at and re-seeks strictly past it on every move,
//! which keeps iteration stable while records are deleted under it.

use super::item::FeedItem;
use super::transaction::{Collection, FeedStore, decode_item, require_write};
use crate::Error;
use chrono::{DateTime, Utc};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};

/// Iteration direction over the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending `(time, id)`.
    Next,
    /// Descending `(time, id)`.
    Prev,
}

impl Direction {
    fn sql(self) -> (&'static str, &'static str) {
        match self {
            Direction::Next => (">", "ASC"),
            Direction::Prev => ("<", "DESC"),
        }
    }
}

/// Inclusive bounds on the indexed time. `None` leaves that side open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub lower: Option<DateTime<Utc>>,
    pub upper: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn at_least(lower: DateTime<Utc>) -> Self {
        Self { lower: Some(lower), upper: None }
    }

    pub fn at_most(upper: DateTime<Utc>) -> Self {
        Self { lower: None, upper: Some(upper) }
    }

    pub fn between(lower: DateTime<Utc>, upper: DateTime<Utc>) -> Self {
        Self { lower: Some(lower), upper: Some(upper) }
    }

    fn bounds(&self) -> (Option<i64>, Option<i64>) {
        (self.lower.map(|t| t.timestamp_millis()), self.upper.map(|t| t.timestamp_millis()))
    }
}

/// Secondary index over feed item `time`.
pub struct DateIndex<'t> {
    pub(crate) store: FeedStore<'t>,
}

impl<'t> DateIndex<'t> {
    /// All items in ascending time order.
    pub fn get_all(&self) -> Result<Vec<FeedItem>, Error> {
        let mut stmt = self.store.conn.prepare("SELECT body FROM wittrs ORDER BY time ASC, id ASC")?;
        let bodies = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, rusqlite::Error>>()?;
        bodies.iter().map(|b| decode_item(b)).collect()
    }

    /// Number of items within `range` (all items when `None`).
    pub fn count(&self, range: Option<TimeRange>) -> Result<u64, Error> {
        let (lower, upper) = range.unwrap_or_default().bounds();
        let count: i64 = self.store.conn.query_row(
            "SELECT COUNT(*) FROM wittrs WHERE (?1 IS NULL OR time >= ?1) AND (?2 IS NULL OR time <= ?2)",
            params![lower, upper],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Position a cursor on the first record of `range` in `direction`.
    ///
    /// Returns `None` when the range is empty.
    pub fn open_cursor(&self, range: Option<TimeRange>, direction: Direction) -> Result<Option<Cursor<'t>>, Error> {
        let range = range.unwrap_or_default();
        let found = seek(&self.store, &range, direction, None, None, 0)?;
        Ok(found.map(|(key, id, value)| Cursor { store: self.store, range, direction, key, id, value }))
    }
}

/// A position in the `by-date` index.
///
/// Movement consumes the cursor and yields the next one, or `None` once the
/// sequence is exhausted.
pub struct Cursor<'t> {
    store: FeedStore<'t>,
    range: TimeRange,
    direction: Direction,
    key: i64,
    id: String,
    value: FeedItem,
}

impl std::fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("direction", &self.direction)
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}

impl<'t> Cursor<'t> {
    pub fn value(&self) -> &FeedItem {
        &self.value
    }

    pub fn into_value(self) -> FeedItem {
        self.value
    }

    pub fn primary_key(&self) -> &str {
        &self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Skip `count` positions forward in the cursor's direction.
    pub fn advance(self, count: u32) -> Result<Option<Self>, Error> {
        if count == 0 {
            return Err(Error::InvalidInput("cursor advance count must be at least 1".into()));
        }
        self.seek_from(None, count - 1)
    }

    /// Move one position.
    pub fn step(self) -> Result<Option<Self>, Error> {
        self.seek_from(None, 0)
    }

    /// Move to the first record past the current one whose time is at or
    /// beyond `key` in the cursor's direction.
    pub fn step_to(self, key: DateTime<Utc>) -> Result<Option<Self>, Error> {
        self.seek_from(Some(key.timestamp_millis()), 0)
    }

    /// Remove the record under the cursor. The position is kept, so a
    /// following `step` lands on the record after the deleted one.
    pub fn delete(&self) -> Result<(), Error> {
        require_write(self.store.mode, Collection::Feed)?;
        self.store.conn.execute("DELETE FROM wittrs WHERE id = ?1", params![&self.id])?;
        Ok(())
    }

    fn seek_from(self, target: Option<i64>, skip: u32) -> Result<Option<Self>, Error> {
        let found = seek(&self.store, &self.range, self.direction, Some((self.key, &self.id)), target, skip)?;
        Ok(found.map(|(key, id, value)| Cursor { key, id, value, ..self }))
    }
}

/// Find the record `skip` positions past `after` (or past the start of the
/// range when `after` is `None`), honouring the range and an optional seek key.
fn seek(
    store: &FeedStore<'_>, range: &TimeRange, direction: Direction, after: Option<(i64, &str)>, target: Option<i64>,
    skip: u32,
) -> Result<Option<(i64, String, FeedItem)>, Error> {
    let (cmp, order) = direction.sql();
    let sql = format!(
        "SELECT time, id, body FROM wittrs
        WHERE (?1 IS NULL OR time {cmp} ?1 OR (time = ?1 AND id {cmp} ?2))
          AND (?3 IS NULL OR time >= ?3)
          AND (?4 IS NULL OR time <= ?4)
          AND (?5 IS NULL OR time {cmp}= ?5)
        ORDER BY time {order}, id {order}
        LIMIT 1 OFFSET ?6"
    );

    let (after_key, after_id) = match after {
        Some((key, id)) => (Some(key), id),
        None => (None, ""),
    };
    let (lower, upper) = range.bounds();

    let row: Option<(i64, String, String)> = store
        .conn
        .query_row(&sql, params![after_key, after_id, lower, upper, target, i64::from(skip)], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .optional()?;

    match row {
        Some((key, id, body)) => {
            tracing::trace!(key, id = %id, ?direction, "cursor positioned");
            Ok(Some((key, id, decode_item(&body)?)))
        }
        None => Ok(None),
    }
}
