//! Versioned schema migrations.
//!
//! The schema version lives in SQLite's `user_version` header field, which is
//! written inside the same transaction as the migration steps. Each applied
//! step is also recorded in a `_migrations` table for diagnostics.

use crate::Error;
use tokio_rusqlite::{Connection, params};

/// A single schema step: everything needed to move a database to `version`.
///
/// Steps must be idempotent (`CREATE ... IF NOT EXISTS`) so a retried open
/// after a failed attempt never trips over half-created objects.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// Bring the database up to `target`, returning the version before the upgrade.
///
/// Steps with `stored < version <= target` are applied in order inside one
/// transaction; any failure rolls every step back. Opening with the stored
/// version is a no-op. Opening with an older version fails with
/// [`Error::VersionDowngrade`].
///
/// # Errors
///
/// Returns an error if a step fails to execute or the stored version is newer
/// than `target`.
pub async fn run(conn: &Connection, migrations: &'static [Migration], target: u32) -> Result<u32, Error> {
    conn.call(move |conn| -> Result<u32, Error> {
        let tx = conn.transaction()?;

        tx.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let stored: u32 = tx.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if stored > target {
            return Err(Error::VersionDowngrade { stored, requested: target });
        }

        for step in migrations.iter().filter(|m| m.version > stored && m.version <= target) {
            tx.execute_batch(step.sql)
                .map_err(|e| Error::MigrationFailed(format!("v{} ({}): {e}", step.version, step.description)))?;
            tx.execute(
                "INSERT OR REPLACE INTO _migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
                params![step.version, step.description, chrono::Utc::now().to_rfc3339()],
            )?;
            tracing::info!(version = step.version, description = step.description, "applied schema migration");
        }

        if stored != target {
            tx.execute_batch(&format!("PRAGMA user_version = {target}"))?;
        }

        tx.commit()?;
        Ok(stored)
    })
    .await
    .map_err(Error::from)
}

/// Highest version any step in the list upgrades to.
pub fn latest(migrations: &[Migration]) -> u32 {
    migrations.iter().map(|m| m.version).max().unwrap_or(0)
}
