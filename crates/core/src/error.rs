//! Unified error types for the wittr offline core.
//!
//! Display strings carry an upper-case category prefix so log lines can be
//! grepped by failure class.

use tokio_rusqlite::rusqlite;

/// Unified error types shared by the store, the reconciler and the asset cache.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., a zero cursor advance).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// A live-update payload could not be decoded into feed items.
    #[error("INVALID_MESSAGE: {0}")]
    InvalidMessage(String),

    /// Database operation failed; the enclosing transaction was rolled back.
    #[error("STORE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// The stored schema is newer than the version requested at open.
    #[error("STORE_ERROR: stored schema version {stored} is newer than requested {requested}")]
    VersionDowngrade { stored: u32, requested: u32 },

    /// A collection was touched outside the transaction's declared scope.
    #[error("STORE_ERROR: collection {0} is not in transaction scope")]
    NotInScope(&'static str),

    /// A write was attempted in a read-only transaction.
    #[error("STORE_ERROR: collection {0} is read-only in this transaction")]
    ReadOnlyTransaction(&'static str),

    /// Stored value could not be (de)serialized.
    #[error("STORE_ERROR: corrupt value: {0}")]
    Corrupt(String),

    /// No cache entry found for the given key.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Fetch timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// Network failure or unusable HTTP response.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// The shell manifest could not be installed in full.
    #[error("INSTALL_FAILED: {0}")]
    InstallFailed(String),

    /// A worker lifecycle transition was requested from the wrong state.
    #[error("WORKER_STATE: {0}")]
    WorkerState(String),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Corrupt(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::CacheMiss("/skeleton".to_string());
        assert!(err.to_string().contains("CACHE_MISS"));
        assert!(err.to_string().contains("/skeleton"));
    }

    #[test]
    fn test_version_downgrade_display() {
        let err = Error::VersionDowngrade { stored: 3, requested: 2 };
        let msg = err.to_string();
        assert!(msg.starts_with("STORE_ERROR"));
        assert!(msg.contains("3"));
        assert!(msg.contains("2"));
    }

    #[test]
    fn test_rusqlite_error_maps_to_database() {
        let err: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, Error::Database(_)));
    }
}
