//! Reconnecting live channel.
//!
//! `Closed -> Connecting -> Open -> Closed -> Connecting ...` with a fixed
//! delay between a drop and the next attempt, no backoff and no retry
//! limit. A failed connect counts as a drop.

use super::frame::FrameScheduler;
use super::{BatchSink, ChannelError, ChannelState, Connection, Connector, ToastId, Toasts};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use url::Url;
use wittr_core::AppConfig;

/// Text of the sticky notification shown while disconnected.
pub const LOST_CONNECTION_MESSAGE: &str = "Unable to connect. Retrying…";

/// Channel endpoint and timing.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub url: Url,
    pub reconnect_delay: Duration,
    pub frame_interval: Duration,
}

impl ChannelConfig {
    pub fn from_app(config: &AppConfig) -> Result<Self, ChannelError> {
        let url = Url::parse(&config.updates_url)
            .map_err(|e| ChannelError::InvalidUrl(format!("{}: {e}", config.updates_url)))?;
        Ok(Self { url, reconnect_delay: config.reconnect_delay(), frame_interval: config.frame_interval() })
    }
}

/// Endpoint for the next connect: `base` with `since=<ms>` when a latest
/// post time is known. Other query pairs are kept; a stale `since` is
/// replaced.
pub fn updates_url(base: &Url, since: Option<chrono::DateTime<chrono::Utc>>) -> Url {
    let Some(since) = since else {
        return base.clone();
    };
    let kept: Vec<(String, String)> =
        base.query_pairs().filter(|(k, _)| k != "since").map(|(k, v)| (k.into_owned(), v.into_owned())).collect();

    let mut url = base.clone();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        pairs.append_pair("since", &since.timestamp_millis().to_string());
    }
    url
}

/// Live channel that keeps reconnecting until its task is dropped.
pub struct ReconnectingChannel {
    connector: Arc<dyn Connector>,
    sink: Arc<dyn BatchSink>,
    toasts: Arc<dyn Toasts>,
    config: ChannelConfig,
    state: watch::Sender<ChannelState>,
    lost_toast: Mutex<Option<ToastId>>,
}

impl ReconnectingChannel {
    pub fn new(
        connector: Arc<dyn Connector>, sink: Arc<dyn BatchSink>, toasts: Arc<dyn Toasts>, config: ChannelConfig,
    ) -> Self {
        let (state, _) = watch::channel(ChannelState::Closed);
        Self { connector, sink, toasts, config, state, lost_toast: Mutex::new(None) }
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    /// Connect, pump batches, and reconnect after every drop. Never returns.
    pub async fn run(&self) {
        let (scheduler, _delivery) = FrameScheduler::spawn(Arc::clone(&self.sink), self.config.frame_interval);
        loop {
            let url = updates_url(&self.config.url, self.sink.latest_post_date());
            self.state.send_replace(ChannelState::Connecting);
            tracing::debug!(%url, "connecting live channel");

            match self.connector.connect(&url).await {
                Ok(connection) => {
                    self.opened();
                    pump(connection, &scheduler).await;
                    tracing::info!("live channel closed");
                }
                Err(e) => tracing::warn!(error = %e, "live channel connect failed"),
            }

            self.lost();
            tokio::time::sleep(self.config.reconnect_delay).await;
        }
    }

    fn opened(&self) {
        self.state.send_replace(ChannelState::Open);
        let toast = self.lost_toast.lock().ok().and_then(|mut slot| slot.take());
        if let Some(toast) = toast {
            self.toasts.hide(toast);
        }
        tracing::info!("live channel open");
    }

    fn lost(&self) {
        self.state.send_replace(ChannelState::Closed);
        let Ok(mut slot) = self.lost_toast.lock() else {
            return;
        };
        if slot.is_none() {
            *slot = Some(self.toasts.show(LOST_CONNECTION_MESSAGE));
        }
    }
}

async fn pump(mut connection: Box<dyn Connection>, scheduler: &FrameScheduler) {
    while let Some(raw) = connection.recv().await {
        if !scheduler.schedule(raw) {
            tracing::warn!("frame delivery stopped, dropping batch");
        }
    }
}
