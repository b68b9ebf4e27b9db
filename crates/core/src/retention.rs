//! Bounded retention for the feed collection.
//!
//! Walks the `by-date` index newest-first, skips the `max_items` most recent
//! records and deletes everything after them. Records tied on the boundary
//! timestamp are ordered by id, so the survivor set is deterministic.

use crate::Error;
use crate::store::{Direction, FeedStore};

/// Delete every feed item older than the `max_items`-th most recent one.
///
/// Must run inside a read-write transaction; when it shares the transaction
/// with the writes it follows, those writes are visible to the scan. Returns
/// the number of deleted records.
pub fn trim(feed: &FeedStore<'_>, max_items: usize) -> Result<u64, Error> {
    let mut cursor = feed.by_date().open_cursor(None, Direction::Prev)?;

    if max_items > 0 {
        let skip = u32::try_from(max_items)
            .map_err(|_| Error::InvalidInput(format!("max_items {max_items} exceeds the index range")))?;
        cursor = match cursor {
            Some(c) => c.advance(skip)?,
            None => None,
        };
    }

    let mut deleted = 0u64;
    while let Some(current) = cursor {
        current.delete()?;
        deleted += 1;
        cursor = current.step()?;
    }

    if deleted > 0 {
        tracing::debug!(deleted, max_items, "trimmed feed history");
    }

    Ok(deleted)
}
