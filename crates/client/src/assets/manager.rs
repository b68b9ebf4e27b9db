//! Asset cache manager.
//!
//! Owns the two buckets of the current worker version and implements the
//! install and activate steps plus the per-request serving policies:
//!
//! - `/` on the app origin: the cached shell (`/skeleton`), never the network
//! - `/photos/...`: cache-first under the variant-free key
//! - `/avatars/...`: stale-while-revalidate under the density-free key
//! - anything else: cache-first against the static bucket, no write-back
//!
//! Concurrent photo misses for the same key are not de-duplicated: each
//! caller fetches, the last write wins, and every caller gets the response
//! its own fetch produced. A failed cache write is logged and the network
//! response is still returned.

use super::keys::{avatar_storage_key, photo_storage_key, request_key};
use super::names::CacheNames;
use crate::fetch::{AssetFetcher, resolve};
use futures_util::future::try_join_all;
use std::sync::Arc;
use url::Url;
use wittr_core::{AppConfig, AssetResponse, Bucket, BucketDb, Error};

/// Path of the app shell inside the static bucket.
pub const SHELL_PATH: &str = "/skeleton";

/// Serving policy picked for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetRoute {
    Shell,
    Photo,
    Avatar,
    Static,
}

/// Pick the policy for `url`. Only same-origin requests get special routes.
pub fn route(origin: &Url, url: &Url) -> AssetRoute {
    if url.origin() != origin.origin() {
        return AssetRoute::Static;
    }
    match url.path() {
        "/" => AssetRoute::Shell,
        path if path.starts_with("/photos/") => AssetRoute::Photo,
        path if path.starts_with("/avatars/") => AssetRoute::Avatar,
        _ => AssetRoute::Static,
    }
}

/// Bucket lifecycle and request serving for one worker version.
#[derive(Clone)]
pub struct AssetCacheManager {
    buckets: BucketDb,
    fetcher: Arc<dyn AssetFetcher>,
    names: CacheNames,
    origin: Url,
    manifest: Vec<Url>,
}

impl AssetCacheManager {
    pub fn new(
        buckets: BucketDb, fetcher: Arc<dyn AssetFetcher>, names: CacheNames, origin: Url, manifest: Vec<Url>,
    ) -> Self {
        Self { buckets, fetcher, names, origin, manifest }
    }

    /// Build a manager from configuration, resolving the manifest against
    /// the configured origin.
    ///
    /// # Errors
    ///
    /// Returns `InvalidUrl` if the origin or any manifest entry is unusable.
    pub fn from_config(buckets: BucketDb, fetcher: Arc<dyn AssetFetcher>, config: &AppConfig) -> Result<Self, Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.origin)))?;
        let manifest = config
            .shell_manifest
            .iter()
            .map(|entry| resolve(&origin, entry).map_err(|e| Error::InvalidUrl(format!("{entry}: {e}"))))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(buckets, fetcher, CacheNames::from(config), origin, manifest))
    }

    pub fn names(&self) -> &CacheNames {
        &self.names
    }

    pub fn buckets(&self) -> &BucketDb {
        &self.buckets
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn manifest(&self) -> &[Url] {
        &self.manifest
    }

    /// Fetch the whole manifest and store it in the static bucket.
    ///
    /// All fetches run concurrently. Nothing is written unless every one
    /// succeeds with a 2xx status. Returns the number of entries stored.
    ///
    /// # Errors
    ///
    /// Returns `InstallFailed` naming the first failing entry, or the
    /// store error if the final write fails.
    pub async fn install(&self) -> Result<usize, Error> {
        let fetches = self.manifest.iter().map(|url| async move {
            match self.fetcher.fetch(url).await {
                Ok(response) if response.is_success() => Ok((request_key(url), response)),
                Ok(response) => Err(Error::InstallFailed(format!("{url}: status {}", response.status))),
                Err(e) => Err(Error::InstallFailed(format!("{url}: {e}"))),
            }
        });
        let entries = try_join_all(fetches).await?;

        let count = entries.len();
        let bucket = self.buckets.open_bucket(&self.names.static_name).await?;
        bucket.put_all(entries).await?;

        tracing::info!(bucket = %self.names.static_name, entries = count, "installed shell assets");
        Ok(count)
    }

    /// Delete every owned bucket that is not in the allowed set.
    ///
    /// Deletions happen in one transaction; buckets outside the namespace
    /// prefix are never touched. Returns the names deleted.
    pub async fn activate(&self) -> Result<Vec<String>, Error> {
        let existing = self.buckets.bucket_names().await?;
        let stale: Vec<String> = self.names.stale(&existing).into_iter().map(str::to_string).collect();
        if stale.is_empty() {
            return Ok(Vec::new());
        }

        let deleted = self.buckets.delete_buckets(stale).await?;
        tracing::info!(deleted = ?deleted, "removed stale buckets");
        Ok(deleted)
    }

    /// Serve a request according to its route.
    pub async fn serve(&self, url: &Url) -> Result<AssetResponse, Error> {
        match route(&self.origin, url) {
            AssetRoute::Shell => self.serve_shell().await,
            AssetRoute::Photo => self.serve_photo(url).await,
            AssetRoute::Avatar => self.serve_avatar(url).await,
            AssetRoute::Static => self.serve_static(url).await,
        }
    }

    fn static_bucket(&self) -> Bucket {
        self.buckets.bucket(&self.names.static_name)
    }

    async fn serve_shell(&self) -> Result<AssetResponse, Error> {
        let shell = resolve(&self.origin, SHELL_PATH).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let key = request_key(&shell);
        self.static_bucket().match_key(&key).await?.ok_or(Error::CacheMiss(key))
    }

    async fn serve_photo(&self, url: &Url) -> Result<AssetResponse, Error> {
        let key = photo_storage_key(url);
        let images = self.buckets.open_bucket(&self.names.images_name).await?;

        if let Some(hit) = images.match_key(&key).await? {
            tracing::debug!(%key, "photo cache hit");
            return Ok(hit);
        }

        tracing::debug!(%key, "photo cache miss");
        let response = self.fetcher.fetch(url).await?;
        if response.is_success() {
            write_back(&images, &key, &response).await;
        }
        Ok(response)
    }

    async fn serve_avatar(&self, url: &Url) -> Result<AssetResponse, Error> {
        let key = avatar_storage_key(url);
        let images = self.buckets.open_bucket(&self.names.images_name).await?;

        let network = {
            let fetcher = Arc::clone(&self.fetcher);
            let images = images.clone();
            let url = url.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let response = fetcher.fetch(&url).await?;
                if response.is_success() {
                    write_back(&images, &key, &response).await;
                }
                Ok::<_, Error>(response)
            })
        };

        if let Some(hit) = images.match_key(&key).await? {
            tracing::debug!(%key, "avatar cache hit, revalidating in background");
            tokio::spawn(async move {
                match network.await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::warn!(%key, error = %e, "avatar revalidation failed"),
                    Err(e) => tracing::warn!(%key, error = %e, "avatar revalidation task failed"),
                }
            });
            return Ok(hit);
        }

        network.await.map_err(|e| Error::HttpError(format!("avatar fetch task failed: {e}")))?
    }

    async fn serve_static(&self, url: &Url) -> Result<AssetResponse, Error> {
        if let Some(hit) = self.static_bucket().match_key(&request_key(url)).await? {
            return Ok(hit);
        }
        self.fetcher.fetch(url).await
    }
}

async fn write_back(images: &Bucket, key: &str, response: &AssetResponse) {
    if let Err(e) = images.put(key, response).await {
        tracing::warn!(%key, bucket = %images.name(), error = %e, "image cache write failed");
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StubFetcher;
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Barrier;

    const ORIGIN: &str = "http://localhost:8888";

    fn url(path: &str) -> Url {
        Url::parse(ORIGIN).unwrap().join(path).unwrap()
    }

    async fn manager(fetcher: Arc<StubFetcher>, manifest: &[&str]) -> AssetCacheManager {
        let buckets = BucketDb::open_in_memory().await.unwrap();
        let manifest = manifest.iter().map(|p| url(p)).collect();
        AssetCacheManager::new(
            buckets,
            fetcher,
            CacheNames::new("wittr-", 8, "wittr-content-imgs"),
            Url::parse(ORIGIN).unwrap(),
            manifest,
        )
    }

    fn not_found() -> AssetResponse {
        AssetResponse { status: 404, content_type: None, body: Bytes::new() }
    }

    #[test]
    fn test_route() {
        let origin = Url::parse(ORIGIN).unwrap();
        assert_eq!(route(&origin, &url("/")), AssetRoute::Shell);
        assert_eq!(route(&origin, &url("/photos/a-320px.jpg")), AssetRoute::Photo);
        assert_eq!(route(&origin, &url("/avatars/sam-2x.jpg")), AssetRoute::Avatar);
        assert_eq!(route(&origin, &url("/js/main.js")), AssetRoute::Static);

        let foreign = Url::parse("https://example.com/photos/a.jpg").unwrap();
        assert_eq!(route(&origin, &foreign), AssetRoute::Static);
        let foreign_root = Url::parse("https://example.com/").unwrap();
        assert_eq!(route(&origin, &foreign_root), AssetRoute::Static);
    }

    #[tokio::test]
    async fn test_from_config_resolves_manifest() {
        let buckets = BucketDb::open_in_memory().await.unwrap();
        let manager = AssetCacheManager::from_config(buckets, StubFetcher::with(&[]), &AppConfig::default()).unwrap();

        assert_eq!(manager.manifest()[0].as_str(), "http://localhost:8888/skeleton");
        assert_eq!(manager.manifest()[1].as_str(), "http://localhost:8888/js/main.js");
        assert_eq!(manager.manifest()[4].host_str(), Some("fonts.gstatic.com"));
        assert_eq!(manager.names().static_name, "wittr-static-v8");
    }

    #[tokio::test]
    async fn test_from_config_rejects_bad_manifest_entry() {
        let buckets = BucketDb::open_in_memory().await.unwrap();
        let config = AppConfig { shell_manifest: vec!["ftp://example.com/a".into()], ..Default::default() };
        let result = AssetCacheManager::from_config(buckets, StubFetcher::with(&[]), &config);
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_install_stores_manifest() {
        let fetcher = StubFetcher::with(&[
            ("http://localhost:8888/skeleton", AssetResponse::ok("<shell>", Some("text/html"))),
            ("http://localhost:8888/js/main.js", AssetResponse::ok("js", None)),
        ]);
        let manager = manager(fetcher, &["/skeleton", "js/main.js"]).await;

        assert_eq!(manager.install().await.unwrap(), 2);

        let keys = manager.buckets().bucket("wittr-static-v8").keys().await.unwrap();
        assert_eq!(keys, vec!["http://localhost:8888/js/main.js", "http://localhost:8888/skeleton"]);
    }

    #[tokio::test]
    async fn test_install_is_all_or_nothing() {
        let fetcher = StubFetcher::with(&[
            ("http://localhost:8888/skeleton", AssetResponse::ok("<shell>", None)),
            ("http://localhost:8888/css/main.css", not_found()),
        ]);
        let manager = manager(fetcher.clone(), &["/skeleton", "css/main.css"]).await;

        assert!(matches!(manager.install().await, Err(Error::InstallFailed(_))));
        assert!(!manager.buckets().has_bucket("wittr-static-v8").await.unwrap());

        fetcher.responses.lock().unwrap().remove("http://localhost:8888/css/main.css");
        assert!(matches!(manager.install().await, Err(Error::InstallFailed(_))));
        assert!(!manager.buckets().has_bucket("wittr-static-v8").await.unwrap());
    }

    #[tokio::test]
    async fn test_activate_deletes_only_stale_owned_buckets() {
        let manager = manager(StubFetcher::with(&[]), &[]).await;
        for name in ["wittr-static-v7", "wittr-content-imgs", "other-app-cache"] {
            manager.buckets().open_bucket(name).await.unwrap();
        }

        let deleted = manager.activate().await.unwrap();

        assert_eq!(deleted, vec!["wittr-static-v7".to_string()]);
        let mut remaining = manager.buckets().bucket_names().await.unwrap();
        remaining.sort();
        assert_eq!(remaining, vec!["other-app-cache".to_string(), "wittr-content-imgs".to_string()]);
        assert!(manager.activate().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shell_served_from_cache_only() {
        let fetcher = StubFetcher::with(&[("http://localhost:8888/skeleton", AssetResponse::ok("<shell>", None))]);
        let manager = manager(fetcher.clone(), &["/skeleton"]).await;

        assert!(matches!(manager.serve(&url("/")).await, Err(Error::CacheMiss(_))));
        assert!(fetcher.calls().is_empty());

        manager.install().await.unwrap();
        let calls_after_install = fetcher.calls().len();

        let shell = manager.serve(&url("/")).await.unwrap();
        assert_eq!(shell.body, Bytes::from("<shell>"));
        assert_eq!(fetcher.calls().len(), calls_after_install);
    }

    #[tokio::test]
    async fn test_photo_cache_first_with_normalized_key() {
        let fetcher = StubFetcher::with(&[(
            "http://localhost:8888/photos/cat-320px.jpg",
            AssetResponse::ok("small", Some("image/jpeg")),
        )]);
        let manager = manager(fetcher.clone(), &[]).await;

        let first = manager.serve(&url("/photos/cat-320px.jpg")).await.unwrap();
        assert_eq!(first.body, Bytes::from("small"));

        // The 640px variant shares the slot and never reaches the network.
        let second = manager.serve(&url("/photos/cat-640px.jpg")).await.unwrap();
        assert_eq!(second.body, Bytes::from("small"));
        assert_eq!(fetcher.calls(), vec!["http://localhost:8888/photos/cat-320px.jpg"]);

        let keys = manager.buckets().bucket("wittr-content-imgs").keys().await.unwrap();
        assert_eq!(keys, vec!["http://localhost:8888/photos/cat.jpg"]);
    }

    #[tokio::test]
    async fn test_photo_miss_network_failure_propagates() {
        let manager = manager(StubFetcher::with(&[]), &[]).await;
        let result = manager.serve(&url("/photos/dog-320px.jpg")).await;
        assert!(matches!(result, Err(Error::HttpError(_))));
    }

    #[tokio::test]
    async fn test_photo_error_status_not_cached() {
        let fetcher = StubFetcher::with(&[("http://localhost:8888/photos/gone-320px.jpg", not_found())]);
        let manager = manager(fetcher, &[]).await;

        let response = manager.serve(&url("/photos/gone-320px.jpg")).await.unwrap();
        assert_eq!(response.status, 404);
        assert!(manager.buckets().bucket("wittr-content-imgs").keys().await.unwrap().is_empty());
    }

    /// Fetcher that drops the image bucket before answering, so the
    /// write-back that follows fails.
    struct DroppingFetcher {
        buckets: BucketDb,
    }

    #[async_trait]
    impl AssetFetcher for DroppingFetcher {
        async fn fetch(&self, _url: &Url) -> Result<AssetResponse, Error> {
            self.buckets.delete_bucket("wittr-content-imgs").await?;
            Ok(AssetResponse::ok("net-bytes", Some("image/jpeg")))
        }
    }

    /// Fetcher that holds every call until `gate` callers have arrived.
    struct GatedFetcher {
        gate: Barrier,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AssetFetcher for GatedFetcher {
        async fn fetch(&self, url: &Url) -> Result<AssetResponse, Error> {
            self.calls.lock().unwrap().push(url.to_string());
            self.gate.wait().await;
            let body = if url.path().contains("320px") { "small" } else { "large" };
            Ok(AssetResponse::ok(body, Some("image/jpeg")))
        }
    }

    #[tokio::test]
    async fn test_failed_write_back_still_returns_network_response() {
        let buckets = BucketDb::open_in_memory().await.unwrap();
        let fetcher = Arc::new(DroppingFetcher { buckets: buckets.clone() });
        let manager = AssetCacheManager::new(
            buckets,
            fetcher,
            CacheNames::new("wittr-", 8, "wittr-content-imgs"),
            Url::parse(ORIGIN).unwrap(),
            Vec::new(),
        );

        let photo = manager.serve(&url("/photos/cat-320px.jpg")).await.unwrap();
        assert_eq!(photo.body, Bytes::from("net-bytes"));

        let avatar = manager.serve(&url("/avatars/sam-2x.jpg")).await.unwrap();
        assert_eq!(avatar.body, Bytes::from("net-bytes"));

        assert!(!manager.buckets().has_bucket("wittr-content-imgs").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_photo_misses_each_fetch() {
        let fetcher = Arc::new(GatedFetcher { gate: Barrier::new(2), calls: Mutex::default() });
        let manager = AssetCacheManager::new(
            BucketDb::open_in_memory().await.unwrap(),
            fetcher.clone(),
            CacheNames::new("wittr-", 8, "wittr-content-imgs"),
            Url::parse(ORIGIN).unwrap(),
            Vec::new(),
        );

        let small_url = url("/photos/x-320px.jpg");
        let large_url = url("/photos/x-640px.jpg");
        let both = async { tokio::join!(manager.serve(&small_url), manager.serve(&large_url)) };
        let (small, large) = tokio::time::timeout(Duration::from_secs(5), both).await.unwrap();

        assert_eq!(small.unwrap().body, Bytes::from("small"));
        assert_eq!(large.unwrap().body, Bytes::from("large"));
        assert_eq!(fetcher.calls.lock().unwrap().len(), 2);

        let images = manager.buckets().bucket("wittr-content-imgs");
        assert_eq!(images.keys().await.unwrap(), vec!["http://localhost:8888/photos/x.jpg"]);
        let stored = images.match_key("http://localhost:8888/photos/x.jpg").await.unwrap().unwrap();
        assert!(stored.body == Bytes::from("small") || stored.body == Bytes::from("large"));
    }

    #[tokio::test]
    async fn test_avatar_cached_returned_while_network_stalls() {
        let fetcher = StubFetcher::with(&[]);
        fetcher.stall("http://localhost:8888/avatars/sam-2x.jpg");
        let manager = manager(fetcher.clone(), &[]).await;
        let images = manager.buckets().open_bucket("wittr-content-imgs").await.unwrap();
        images.put("http://localhost:8888/avatars/sam.jpg", &AssetResponse::ok("cached", None)).await.unwrap();

        let response = tokio::time::timeout(Duration::from_secs(5), manager.serve(&url("/avatars/sam-2x.jpg")))
            .await
            .expect("cached avatar must not wait on the network")
            .unwrap();

        assert_eq!(response.body, Bytes::from("cached"));
    }

    #[tokio::test]
    async fn test_avatar_revalidates_in_background() {
        let fetcher = StubFetcher::with(&[("http://localhost:8888/avatars/sam-1x.jpg", AssetResponse::ok("fresh", None))]);
        let manager = manager(fetcher.clone(), &[]).await;
        let images = manager.buckets().open_bucket("wittr-content-imgs").await.unwrap();
        images.put("http://localhost:8888/avatars/sam.jpg", &AssetResponse::ok("stale", None)).await.unwrap();

        let response = manager.serve(&url("/avatars/sam-1x.jpg")).await.unwrap();
        assert_eq!(response.body, Bytes::from("stale"));

        let mut refreshed = None;
        for _ in 0..100 {
            let current = images.match_key("http://localhost:8888/avatars/sam.jpg").await.unwrap().unwrap();
            if current.body == Bytes::from("fresh") {
                refreshed = Some(current);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(refreshed.is_some());
    }

    #[tokio::test]
    async fn test_avatar_miss_waits_for_network() {
        let fetcher = StubFetcher::with(&[("http://localhost:8888/avatars/kim-2x.jpg", AssetResponse::ok("net", None))]);
        let manager = manager(fetcher, &[]).await;

        let response = manager.serve(&url("/avatars/kim-2x.jpg")).await.unwrap();
        assert_eq!(response.body, Bytes::from("net"));

        let images = manager.buckets().bucket("wittr-content-imgs");
        assert!(images.match_key("http://localhost:8888/avatars/kim.jpg").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_static_cache_first_without_write_back() {
        let fetcher = StubFetcher::with(&[
            ("http://localhost:8888/css/main.css", AssetResponse::ok("installed", None)),
            ("http://localhost:8888/other.js", AssetResponse::ok("net", None)),
        ]);
        let manager = manager(fetcher.clone(), &["css/main.css"]).await;
        manager.install().await.unwrap();
        fetcher.set("http://localhost:8888/css/main.css", AssetResponse::ok("changed", None));

        let css = manager.serve(&url("/css/main.css")).await.unwrap();
        assert_eq!(css.body, Bytes::from("installed"));

        let other = manager.serve(&url("/other.js")).await.unwrap();
        assert_eq!(other.body, Bytes::from("net"));
        let keys = manager.buckets().bucket("wittr-static-v8").keys().await.unwrap();
        assert_eq!(keys, vec!["http://localhost:8888/css/main.css"]);
    }
}
