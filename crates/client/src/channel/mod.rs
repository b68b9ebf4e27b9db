//! Live-update channel.
//!
//! The transport sits behind [`Connector`]/[`Connection`]; notifications
//! behind [`Toasts`]; inbound batches go to a [`BatchSink`] (normally the
//! core `Reconciler`) through the [`FrameScheduler`].

pub mod frame;
pub mod reconnect;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;
use wittr_core::Reconciler;

pub use frame::FrameScheduler;
pub use reconnect::{ChannelConfig, LOST_CONNECTION_MESSAGE, ReconnectingChannel, updates_url};

/// Error type for channel setup and connection attempts.
///
/// A dropped connection is not an error; it is handled by reconnecting.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    #[error("CONNECT_FAILED: {0}")]
    ConnectFailed(String),

    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),
}

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Closed,
    Connecting,
    Open,
}

/// Opens live connections.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Connection>, ChannelError>;
}

/// One open connection.
#[async_trait]
pub trait Connection: Send {
    /// Next serialized batch, or `None` once the connection has closed.
    async fn recv(&mut self) -> Option<String>;
}

/// Identifies a toast so it can be hidden later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ToastId(pub u64);

/// Notification surface.
pub trait Toasts: Send + Sync {
    fn show(&self, message: &str) -> ToastId;
    fn hide(&self, toast: ToastId);
}

/// Consumer of inbound batches.
#[async_trait]
pub trait BatchSink: Send + Sync {
    /// Handle one serialized batch. Failures are the sink's to report.
    async fn deliver(&self, raw: String);

    /// Newest post time already known, for the `since` parameter.
    fn latest_post_date(&self) -> Option<DateTime<Utc>>;
}

#[async_trait]
impl BatchSink for Reconciler {
    async fn deliver(&self, raw: String) {
        if let Err(e) = self.reconcile(&raw).await {
            tracing::warn!(error = %e, "live batch not persisted");
        }
    }

    fn latest_post_date(&self) -> Option<DateTime<Utc>> {
        self.view().latest_post_date()
    }
}
