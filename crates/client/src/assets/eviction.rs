//! Reachability eviction for the image bucket.
//!
//! An image stays cached only while some stored feed item references it.
//! Entries are matched by URL path; a cached `/photos/x.jpg` is also kept
//! when an item references the extension-less `/photos/x`.

use std::collections::HashSet;
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;
use wittr_core::{BucketDb, Error, Storage};

/// Delete every image entry no stored feed item references.
///
/// Returns the number of entries deleted. Does nothing when storage is
/// unsupported, since an empty feed would otherwise wipe the bucket.
pub async fn clean_image_cache(storage: &Storage, buckets: &BucketDb, images_bucket: &str) -> Result<u64, Error> {
    if !storage.is_available() {
        return Ok(0);
    }

    let items = storage.all_items().await?;
    let referenced: HashSet<String> =
        items.iter().flat_map(|item| item.image_refs()).map(reference_path).collect();

    let images = buckets.open_bucket(images_bucket).await?;
    let unreferenced: Vec<String> =
        images.keys().await?.into_iter().filter(|key| !is_referenced(&referenced, key)).collect();

    if unreferenced.is_empty() {
        return Ok(0);
    }
    let deleted = images.delete_keys(unreferenced).await?;
    tracing::debug!(deleted, referenced = referenced.len(), "evicted unreferenced images");
    Ok(deleted)
}

/// Run [`clean_image_cache`] now and then every `every`, forever.
///
/// Failures are logged and the next tick runs as usual.
pub fn spawn_eviction_loop(storage: Storage, buckets: BucketDb, images_bucket: String, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = clean_image_cache(&storage, &buckets, &images_bucket).await {
                tracing::warn!(error = %e, "image cache eviction failed");
            }
        }
    })
}

/// Path part of a feed reference, which may be a path or a full URL.
fn reference_path(image: &str) -> String {
    match Url::parse(image) {
        Ok(url) => url.path().to_string(),
        Err(_) => image.split(['?', '#']).next().unwrap_or(image).to_string(),
    }
}

fn is_referenced(referenced: &HashSet<String>, key: &str) -> bool {
    let path = reference_path(key);
    referenced.contains(&path) || path.strip_suffix(".jpg").is_some_and(|stem| referenced.contains(stem))
}
