//! Live-update reconciliation.
//!
//! Inbound batches are handed to the presentation view first, then merged
//! into the feed store and trimmed in one read-write transaction. Rendering
//! never waits on storage, and an unsupported store simply skips the merge.

use crate::Error;
use crate::retention;
use crate::store::{Collection, FeedItem, Storage, TxMode, parse_batch};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Items retained after every live update.
pub const DEFAULT_MAX_ITEMS: usize = 30;

/// Presentation sink for feed items.
pub trait PostsView: Send + Sync {
    /// Render a batch of items, in the order given.
    fn add_posts(&self, items: &[FeedItem]);

    /// Whether posts are already on screen (e.g. a server-rendered first page).
    fn showing_posts(&self) -> bool;

    /// Time of the newest post on screen, if any.
    fn latest_post_date(&self) -> Option<DateTime<Utc>>;
}

/// What a single reconciliation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Items decoded from the batch and delivered to the view.
    pub received: usize,
    /// Items removed by the retention trim.
    pub trimmed: u64,
    /// Whether the batch was written to the store.
    pub persisted: bool,
}

/// Merges live-update batches into the feed store.
pub struct Reconciler {
    storage: Storage,
    view: Arc<dyn PostsView>,
    max_items: usize,
}

impl Reconciler {
    pub fn new(storage: Storage, view: Arc<dyn PostsView>, max_items: usize) -> Self {
        Self { storage, view, max_items }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn view(&self) -> &Arc<dyn PostsView> {
        &self.view
    }

    /// Reconcile one serialized batch.
    ///
    /// The view receives the decoded items before any storage work starts.
    /// A storage failure aborts the whole transaction (no partial upserts,
    /// no trim) and is returned to the caller, who may ignore it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMessage` for an undecodable batch, or the store error
    /// that aborted the transaction.
    pub async fn reconcile(&self, raw: &str) -> Result<ReconcileOutcome, Error> {
        let items = parse_batch(raw)?;
        self.view.add_posts(&items);

        let received = items.len();
        let Some(db) = self.storage.db() else {
            return Ok(ReconcileOutcome { received, trimmed: 0, persisted: false });
        };

        let max_items = self.max_items;
        let trimmed = db
            .transaction(&[Collection::Feed], TxMode::ReadWrite, move |tx| {
                let feed = tx.feed()?;
                for item in &items {
                    feed.put(item)?;
                }
                retention::trim(&feed, max_items)
            })
            .await?;

        tracing::debug!(received, trimmed, "reconciled live batch");
        Ok(ReconcileOutcome { received, trimmed, persisted: true })
    }

    /// Show stored history newest-first, unless the view already has posts.
    ///
    /// Returns the number of items delivered.
    pub async fn show_cached(&self) -> Result<usize, Error> {
        if !self.storage.is_available() || self.view.showing_posts() {
            return Ok(0);
        }
        let items = self.storage.newest_first().await?;
        if !items.is_empty() {
            self.view.add_posts(&items);
        }
        Ok(items.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FeedDb;
    use crate::store::fixtures::item;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingView {
        batches: Mutex<Vec<Vec<String>>>,
        showing: bool,
    }

    impl RecordingView {
        fn batches(&self) -> Vec<Vec<String>> {
            self.batches.lock().unwrap().clone()
        }
    }

    impl PostsView for RecordingView {
        fn add_posts(&self, items: &[FeedItem]) {
            self.batches.lock().unwrap().push(items.iter().map(|i| i.id.clone()).collect());
        }

        fn showing_posts(&self) -> bool {
            self.showing
        }

        fn latest_post_date(&self) -> Option<DateTime<Utc>> {
            None
        }
    }

    fn batch(items: &[FeedItem]) -> String {
        serde_json::to_string(items).unwrap()
    }

    async fn stored_times(db: &FeedDb) -> Vec<i64> {
        let mut times: Vec<i64> = db.all_items().await.unwrap().iter().map(|i| i.time.timestamp()).collect();
        times.sort();
        times
    }

    #[tokio::test]
    async fn test_reconcile_then_trim_scenario() {
        let db = FeedDb::open_in_memory().await.unwrap();
        db.put_items(vec![item("t1", 1), item("t2", 2), item("t3", 3)]).await.unwrap();
        let view = Arc::new(RecordingView::default());
        let reconciler = Reconciler::new(db.clone().into(), view.clone(), 3);

        let outcome = reconciler.reconcile(&batch(&[item("t4", 4)])).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome { received: 1, trimmed: 1, persisted: true });
        assert_eq!(stored_times(&db).await, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_reconcile_keeps_thirty_most_recent() {
        for n in [5i64, 30, 31, 64] {
            let db = FeedDb::open_in_memory().await.unwrap();
            let view = Arc::new(RecordingView::default());
            let reconciler = Reconciler::new(db.clone().into(), view, DEFAULT_MAX_ITEMS);

            let items: Vec<FeedItem> = (0..n).map(|t| item(&format!("p{t:03}"), t)).collect();
            reconciler.reconcile(&batch(&items)).await.unwrap();

            let expected: Vec<i64> = ((n - 30).max(0)..n).collect();
            assert_eq!(stored_times(&db).await, expected, "n = {n}");
        }
    }

    #[tokio::test]
    async fn test_view_receives_batch_in_original_order() {
        let db = FeedDb::open_in_memory().await.unwrap();
        let view = Arc::new(RecordingView::default());
        let reconciler = Reconciler::new(db.into(), view.clone(), DEFAULT_MAX_ITEMS);

        reconciler.reconcile(&batch(&[item("b", 2), item("a", 1), item("c", 3)])).await.unwrap();

        assert_eq!(view.batches(), vec![vec!["b".to_string(), "a".to_string(), "c".to_string()]]);
    }

    #[tokio::test]
    async fn test_unsupported_storage_still_renders() {
        let view = Arc::new(RecordingView::default());
        let reconciler = Reconciler::new(Storage::Unsupported, view.clone(), DEFAULT_MAX_ITEMS);

        let outcome = reconciler.reconcile(&batch(&[item("a", 1)])).await.unwrap();

        assert!(!outcome.persisted);
        assert_eq!(view.batches().len(), 1);
        assert_eq!(reconciler.show_cached().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_batch_rejected_before_render() {
        let db = FeedDb::open_in_memory().await.unwrap();
        let view = Arc::new(RecordingView::default());
        let reconciler = Reconciler::new(db.into(), view.clone(), DEFAULT_MAX_ITEMS);

        let result = reconciler.reconcile("not json").await;
        assert!(matches!(result, Err(Error::InvalidMessage(_))));
        assert!(view.batches().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_still_renders() {
        // Version 0 has no feed collection, so every write fails.
        let db = FeedDb::open_in_memory_at(0).await.unwrap();
        let view = Arc::new(RecordingView::default());
        let reconciler = Reconciler::new(db.into(), view.clone(), DEFAULT_MAX_ITEMS);

        let result = reconciler.reconcile(&batch(&[item("a", 1)])).await;
        assert!(matches!(result, Err(Error::Database(_))));
        assert_eq!(view.batches().len(), 1);
    }

    #[tokio::test]
    async fn test_show_cached_newest_first() {
        let db = FeedDb::open_in_memory().await.unwrap();
        db.put_items(vec![item("a", 1), item("c", 3), item("b", 2)]).await.unwrap();
        let view = Arc::new(RecordingView::default());
        let reconciler = Reconciler::new(db.into(), view.clone(), DEFAULT_MAX_ITEMS);

        assert_eq!(reconciler.show_cached().await.unwrap(), 3);
        assert_eq!(view.batches(), vec![vec!["c".to_string(), "b".to_string(), "a".to_string()]]);
    }

    #[tokio::test]
    async fn test_show_cached_skipped_when_already_showing() {
        let db = FeedDb::open_in_memory().await.unwrap();
        db.put_items(vec![item("a", 1)]).await.unwrap();
        let view = Arc::new(RecordingView { showing: true, ..Default::default() });
        let reconciler = Reconciler::new(db.into(), view.clone(), DEFAULT_MAX_ITEMS);

        assert_eq!(reconciler.show_cached().await.unwrap(), 0);
        assert!(view.batches().is_empty());
    }
}
