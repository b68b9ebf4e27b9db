//! Log-backed presentation: posts and toasts are written to the log.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use wittr_client::channel::{ToastId, Toasts};
use wittr_core::{FeedItem, PostsView};

#[derive(Default)]
pub struct LogView {
    shown: AtomicU64,
    latest: Mutex<Option<DateTime<Utc>>>,
}

impl PostsView for LogView {
    fn add_posts(&self, items: &[FeedItem]) {
        for item in items {
            tracing::info!(id = %item.id, time = %item.time.to_rfc3339(), "post");
        }
        self.shown.fetch_add(items.len() as u64, Ordering::Relaxed);

        let newest = items.iter().map(|item| item.time).max();
        if let Ok(mut latest) = self.latest.lock() {
            *latest = (*latest).max(newest);
        }
    }

    fn showing_posts(&self) -> bool {
        self.shown.load(Ordering::Relaxed) > 0
    }

    fn latest_post_date(&self) -> Option<DateTime<Utc>> {
        self.latest.lock().ok().and_then(|latest| *latest)
    }
}

#[derive(Default)]
pub struct LogToasts {
    next: AtomicU64,
}

impl Toasts for LogToasts {
    fn show(&self, message: &str) -> ToastId {
        let id = ToastId(self.next.fetch_add(1, Ordering::Relaxed));
        tracing::warn!(toast = id.0, "{message}");
        id
    }

    fn hide(&self, toast: ToastId) {
        tracing::info!(toast = toast.0, "toast dismissed");
    }
}
