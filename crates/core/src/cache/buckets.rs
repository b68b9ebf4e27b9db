//! Named response buckets.
//!
//! A bucket maps request keys to stored responses. Buckets are created on
//! first open and deleted wholesale; deleting a bucket cascades to its
//! entries.

use super::connection::BucketDb;
use crate::Error;
use bytes::Bytes;
use chrono::Utc;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};

/// A stored (or freshly fetched) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl AssetResponse {
    /// A 200 response with the given body.
    pub fn ok(body: impl Into<Bytes>, content_type: Option<&str>) -> Self {
        Self { status: 200, content_type: content_type.map(str::to_string), body: body.into() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn read_response(row: &rusqlite::Row<'_>) -> rusqlite::Result<AssetResponse> {
    Ok(AssetResponse {
        status: row.get(0)?,
        content_type: row.get(1)?,
        body: Bytes::from(row.get::<_, Vec<u8>>(2)?),
    })
}

impl BucketDb {
    /// Names of every bucket, oldest first.
    pub async fn bucket_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM cache_buckets ORDER BY created_at ASC, name ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, rusqlite::Error>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn has_bucket(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM cache_buckets WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Open a bucket by name, creating it if needed.
    pub async fn open_bucket(&self, name: &str) -> Result<Bucket, Error> {
        let owned = name.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO cache_buckets (name, created_at) VALUES (?1, ?2)",
                    params![owned, Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;
        Ok(Bucket { db: self.clone(), name: name.to_string() })
    }

    /// Handle to a bucket without creating it.
    ///
    /// Reads against a bucket that does not exist find nothing; writes
    /// need a handle from [`BucketDb::open_bucket`].
    pub fn bucket(&self, name: &str) -> Bucket {
        Bucket { db: self.clone(), name: name.to_string() }
    }

    /// Delete a bucket and all of its entries.
    ///
    /// Returns false if no bucket had that name.
    pub async fn delete_bucket(&self, name: &str) -> Result<bool, Error> {
        let deleted = self.delete_buckets(vec![name.to_string()]).await?;
        Ok(!deleted.is_empty())
    }

    /// Delete several buckets in one transaction: either all go or none do.
    ///
    /// Returns the names that existed and were removed.
    pub async fn delete_buckets(&self, names: Vec<String>) -> Result<Vec<String>, Error> {
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let tx = conn.transaction()?;
                let mut deleted = Vec::new();
                for name in names {
                    if tx.execute("DELETE FROM cache_buckets WHERE name = ?1", params![&name])? > 0 {
                        deleted.push(name);
                    }
                }
                tx.commit()?;
                Ok(deleted)
            })
            .await
            .map_err(Error::from)
    }

    /// Look a key up across every bucket, oldest bucket first.
    pub async fn match_any(&self, key: &str) -> Result<Option<AssetResponse>, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<AssetResponse>, Error> {
                let found = conn
                    .query_row(
                        "SELECT e.status, e.content_type, e.body
                        FROM cache_entries e JOIN cache_buckets b ON b.name = e.bucket
                        WHERE e.request_key = ?1
                        ORDER BY b.created_at ASC, b.name ASC
                        LIMIT 1",
                        params![key],
                        read_response,
                    )
                    .optional()?;
                Ok(found)
            })
            .await
            .map_err(Error::from)
    }
}

/// Handle to a single named bucket.
#[derive(Clone, Debug)]
pub struct Bucket {
    db: BucketDb,
    name: String,
}

impl Bucket {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stored response for `key`, if any.
    pub async fn match_key(&self, key: &str) -> Result<Option<AssetResponse>, Error> {
        let bucket = self.name.clone();
        let key = key.to_string();
        self.db
            .conn
            .call(move |conn| -> Result<Option<AssetResponse>, Error> {
                let found = conn
                    .query_row(
                        "SELECT status, content_type, body FROM cache_entries WHERE bucket = ?1 AND request_key = ?2",
                        params![bucket, key],
                        read_response,
                    )
                    .optional()?;
                Ok(found)
            })
            .await
            .map_err(Error::from)
    }

    /// Store a response under `key`, replacing any previous entry.
    pub async fn put(&self, key: &str, response: &AssetResponse) -> Result<(), Error> {
        self.put_all(vec![(key.to_string(), response.clone())]).await
    }

    /// Store several responses in one transaction.
    pub async fn put_all(&self, entries: Vec<(String, AssetResponse)>) -> Result<(), Error> {
        let bucket = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                let stored_at = Utc::now().to_rfc3339();
                for (key, response) in &entries {
                    tx.execute(
                        "INSERT INTO cache_entries (bucket, request_key, status, content_type, body, stored_at)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                        ON CONFLICT(bucket, request_key) DO UPDATE SET
                            status = excluded.status,
                            content_type = excluded.content_type,
                            body = excluded.body,
                            stored_at = excluded.stored_at",
                        params![&bucket, key, response.status, &response.content_type, &response.body[..], &stored_at],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Every request key in the bucket.
    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        let bucket = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt =
                    conn.prepare("SELECT request_key FROM cache_entries WHERE bucket = ?1 ORDER BY request_key ASC")?;
                let keys = stmt
                    .query_map(params![bucket], |row| row.get(0))?
                    .collect::<Result<Vec<String>, rusqlite::Error>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove one entry. Returns whether it existed.
    pub async fn delete(&self, key: &str) -> Result<bool, Error> {
        Ok(self.delete_keys(vec![key.to_string()]).await? > 0)
    }

    /// Remove several entries in one transaction. Returns the number removed.
    pub async fn delete_keys(&self, keys: Vec<String>) -> Result<u64, Error> {
        let bucket = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                let mut deleted = 0u64;
                for key in &keys {
                    deleted += tx.execute(
                        "DELETE FROM cache_entries WHERE bucket = ?1 AND request_key = ?2",
                        params![&bucket, key],
                    )? as u64;
                }
                tx.commit()?;
                Ok(deleted)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_match() {
        let db = BucketDb::open_in_memory().await.unwrap();
        let bucket = db.open_bucket("wittr-static-v8").await.unwrap();
        let response = AssetResponse::ok("<html></html>", Some("text/html"));

        bucket.put("http://localhost:8888/skeleton", &response).await.unwrap();

        let found = bucket.match_key("http://localhost:8888/skeleton").await.unwrap();
        assert_eq!(found, Some(response));
        assert!(bucket.match_key("http://localhost:8888/other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_buckets_are_isolated() {
        let db = BucketDb::open_in_memory().await.unwrap();
        let shell = db.open_bucket("wittr-static-v8").await.unwrap();
        let images = db.open_bucket("wittr-content-imgs").await.unwrap();

        images.put("k", &AssetResponse::ok("img", None)).await.unwrap();

        assert!(shell.match_key("k").await.unwrap().is_none());
        assert!(db.match_any("k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_open_bucket_is_idempotent() {
        let db = BucketDb::open_in_memory().await.unwrap();
        let first = db.open_bucket("wittr-content-imgs").await.unwrap();
        first.put("k", &AssetResponse::ok("img", None)).await.unwrap();

        let again = db.open_bucket("wittr-content-imgs").await.unwrap();
        assert_eq!(again.keys().await.unwrap(), vec!["k".to_string()]);
        assert_eq!(db.bucket_names().await.unwrap(), vec!["wittr-content-imgs".to_string()]);
    }

    #[tokio::test]
    async fn test_unopened_bucket_reads_empty() {
        let db = BucketDb::open_in_memory().await.unwrap();
        let bucket = db.bucket("wittr-static-v8");

        assert!(bucket.match_key("k").await.unwrap().is_none());
        assert!(bucket.keys().await.unwrap().is_empty());
        assert!(!db.has_bucket("wittr-static-v8").await.unwrap());
        assert!(bucket.put("k", &AssetResponse::ok("x", None)).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_bucket_cascades() {
        let db = BucketDb::open_in_memory().await.unwrap();
        let old = db.open_bucket("wittr-static-v7").await.unwrap();
        old.put("k", &AssetResponse::ok("old", None)).await.unwrap();

        assert!(db.delete_bucket("wittr-static-v7").await.unwrap());
        assert!(!db.delete_bucket("wittr-static-v7").await.unwrap());
        assert!(!db.has_bucket("wittr-static-v7").await.unwrap());
        assert!(db.match_any("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_buckets_reports_existing_only() {
        let db = BucketDb::open_in_memory().await.unwrap();
        db.open_bucket("a").await.unwrap();
        db.open_bucket("b").await.unwrap();

        let deleted = db.delete_buckets(vec!["a".into(), "missing".into()]).await.unwrap();
        assert_eq!(deleted, vec!["a".to_string()]);
        assert_eq!(db.bucket_names().await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_put_replaces_and_delete_keys() {
        let db = BucketDb::open_in_memory().await.unwrap();
        let bucket = db.open_bucket("imgs").await.unwrap();
        bucket.put("a", &AssetResponse::ok("one", None)).await.unwrap();
        bucket.put("a", &AssetResponse::ok("two", None)).await.unwrap();
        bucket.put("b", &AssetResponse::ok("b", None)).await.unwrap();

        let found = bucket.match_key("a").await.unwrap().unwrap();
        assert_eq!(found.body, Bytes::from("two"));

        assert_eq!(bucket.delete_keys(vec!["a".into(), "zzz".into()]).await.unwrap(), 1);
        assert!(bucket.delete("b").await.unwrap());
        assert!(bucket.keys().await.unwrap().is_empty());
    }

    #[test]
    fn test_is_success() {
        assert!(AssetResponse::ok("", None).is_success());
        let not_found = AssetResponse { status: 404, content_type: None, body: Bytes::new() };
        assert!(!not_found.is_success());
    }
}
