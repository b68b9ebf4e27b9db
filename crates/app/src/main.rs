//! wittr-sync entry point.
//!
//! Opens the feed store and the asset buckets, installs and activates the
//! shell cache, shows cached history, then keeps the live channel running
//! until interrupted. Live batches are read line by line from stdin.
//! Logging goes to stderr.

use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use wittr_client::assets::spawn_eviction_loop;
use wittr_client::{AssetCacheManager, ChannelConfig, FetchConfig, HttpFetcher, ReconnectingChannel, Worker};
use wittr_core::{AppConfig, BucketDb, Reconciler, Storage};

mod stdio;
mod view;

use stdio::LineConnector;
use view::{LogToasts, LogView};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        db = %config.db_path.display(),
        cache_db = %config.cache_db_path.display(),
        updates = %config.updates_url,
        "starting wittr-sync"
    );

    let storage = Storage::open(&config).await?;
    let buckets = BucketDb::open(&config.cache_db_path).await?;

    let fetcher = Arc::new(HttpFetcher::new(FetchConfig::from(&config))?);
    let worker = Worker::new(AssetCacheManager::from_config(buckets.clone(), fetcher, &config)?);
    match worker.start(false).await {
        Ok(state) => tracing::info!(?state, "asset worker started"),
        Err(e) => tracing::warn!(error = %e, "asset worker not installed; serving without a shell cache"),
    }

    let view = Arc::new(LogView::default());
    let reconciler = Arc::new(Reconciler::new(storage.clone(), view, config.max_items));
    match reconciler.show_cached().await {
        Ok(shown) => tracing::info!(shown, "cached history shown"),
        Err(e) => tracing::warn!(error = %e, "could not read cached history"),
    }

    let eviction =
        spawn_eviction_loop(storage, buckets, config.images_cache_name.clone(), config.eviction_interval());

    let channel = ReconnectingChannel::new(
        Arc::new(LineConnector::stdin()),
        reconciler,
        Arc::new(LogToasts::default()),
        ChannelConfig::from_app(&config)?,
    );

    tokio::select! {
        _ = channel.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("shutting down");
        }
    }

    eviction.abort();
    Ok(())
}
