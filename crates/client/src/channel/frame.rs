//! Frame-granular delivery of inbound batches.
//!
//! Batches are never handed over on the receive path itself. They queue
//! until the next frame tick, then every queued batch is delivered in
//! arrival order.

use super::BatchSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Queue feeding a [`BatchSink`] once per frame.
#[derive(Clone, Debug)]
pub struct FrameScheduler {
    tx: mpsc::UnboundedSender<String>,
}

impl FrameScheduler {
    /// Start the delivery task. It ends once every scheduler clone is dropped
    /// and the queue has drained.
    pub fn spawn(sink: Arc<dyn BatchSink>, frame: Duration) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(deliver_frames(rx, sink, frame));
        (Self { tx }, handle)
    }

    /// Queue a batch for the next frame. Returns false if delivery has stopped.
    pub fn schedule(&self, raw: String) -> bool {
        self.tx.send(raw).is_ok()
    }
}

async fn deliver_frames(mut rx: mpsc::UnboundedReceiver<String>, sink: Arc<dyn BatchSink>, frame: Duration) {
    let mut ticker = tokio::time::interval(frame);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately.
    ticker.tick().await;

    while let Some(first) = rx.recv().await {
        ticker.tick().await;

        let mut pending = vec![first];
        while let Ok(next) = rx.try_recv() {
            pending.push(next);
        }
        tracing::debug!(batches = pending.len(), "delivering frame");
        for raw in pending {
            sink.deliver(raw).await;
        }
    }
}
