//! SQLite connection setup shared by the feed store and the bucket store.
//!
//! Opens the database on a tokio-rusqlite background thread and applies the
//! pragmas both stores rely on (WAL for interleaved readers, foreign keys for
//! bucket cascade deletes).

use crate::Error;
use std::path::Path;
use tokio_rusqlite::Connection;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA foreign_keys=ON;";

/// Open a database file, creating it if it doesn't exist.
pub(crate) async fn open(path: impl AsRef<Path>) -> Result<Connection, Error> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::InvalidInput(format!("cannot create {}: {e}", parent.display())))?;
    }

    let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
    apply_pragmas(&conn).await?;
    Ok(conn)
}

/// Open an in-memory database with the same pragma configuration.
pub(crate) async fn open_in_memory() -> Result<Connection, Error> {
    let conn = Connection::open_in_memory()
        .await
        .map_err(|e| Error::Database(e.into()))?;
    apply_pragmas(&conn).await?;
    Ok(conn)
}

async fn apply_pragmas(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| {
        conn.execute_batch(PRAGMAS)?;
        Ok(())
    })
    .await
    .map_err(Error::Database)
}
