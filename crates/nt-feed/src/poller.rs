// poller.rs - Background task that refreshes the feed on an interval.
//
// The latest successful fetch is published through a `watch` channel so
// readers always see a complete snapshot. A failed fetch is logged and the
// previous snapshot stays in place. Shutdown is explicit: `shutdown()` signals
// the task, cancels an in-flight fetch and waits for the task to exit.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::entry::DocumentFeedEntry;
use crate::error::FeedError;
use crate::source::DocumentFeed;

/// One successful read of the feed.
#[derive(Debug, Clone, Default)]
pub struct FeedSnapshot {
    pub entries: Vec<DocumentFeedEntry>,
    /// `None` until the first successful fetch.
    pub fetched_at: Option<DateTime<Utc>>,
    /// Incremented on every successful fetch.
    pub generation: u64,
}

/// Handle on the polling task.
pub struct FeedPoller {
    snapshot: watch::Receiver<Arc<FeedSnapshot>>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl FeedPoller {
    /// Start polling `feed` every `interval`. The first fetch runs immediately.
    /// Must be called from within a tokio runtime.
    pub fn spawn(feed: Arc<dyn DocumentFeed>, interval: Duration) -> Self {
        let (tx, rx) = watch::channel(Arc::new(FeedSnapshot::default()));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(poll_loop(feed, interval, tx, shutdown_rx));
        Self {
            snapshot: rx,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Most recent successful snapshot.
    pub fn latest(&self) -> Arc<FeedSnapshot> {
        self.snapshot.borrow().clone()
    }

    /// Independent receiver for consumers that want to await refreshes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<FeedSnapshot>> {
        self.snapshot.clone()
    }

    /// Wait for the next successful fetch. `false` once the task has stopped.
    pub async fn changed(&mut self) -> bool {
        self.snapshot.changed().await.is_ok()
    }

    /// Stop the task and wait for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!("feed poller task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for FeedPoller {
    fn drop(&mut self) {
        // Dropping the sender closes the oneshot, which the loop treats as stop.
        self.shutdown.take();
    }
}

async fn poll_loop(
    feed: Arc<dyn DocumentFeed>,
    interval: Duration,
    tx: watch::Sender<Arc<FeedSnapshot>>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let source = feed.describe();
    tracing::info!("feed poller started ({}, every {:?})", source, interval);

    let mut generation = 0u64;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }

        let result: Result<Vec<DocumentFeedEntry>, FeedError> = tokio::select! {
            _ = &mut shutdown => break,
            result = feed.fetch() => result,
        };

        match result {
            Ok(entries) => {
                generation += 1;
                tracing::debug!(
                    "feed {} refreshed: {} entr(ies), generation {}",
                    source,
                    entries.len(),
                    generation
                );
                let snapshot = FeedSnapshot {
                    entries,
                    fetched_at: Some(Utc::now()),
                    generation,
                };
                tx.send_replace(Arc::new(snapshot));
            }
            Err(e) => {
                tracing::warn!("feed {} fetch failed, keeping previous snapshot: {}", source, e);
            }
        }
    }

    tracing::info!("feed poller stopped ({})", source);
}
