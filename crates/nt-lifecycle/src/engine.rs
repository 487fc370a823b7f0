// engine.rs - Engine: lifecycle manager, dispatcher and feed poller together.
//
// The poller is owned by the engine, so `shutdown().await` is the single
// place background work stops.

use std::sync::Arc;
use std::time::Duration;

use nt_case::Case;
use nt_feed::{DocumentFeed, FeedPoller, FeedSnapshot, ReadinessSet};
use tokio::sync::watch;
use uuid::Uuid;

use crate::dispatcher::{DispatchReport, NotificationDispatcher, DEFAULT_DISPATCH_TIMEOUT};
use crate::error::DispatchError;
use crate::manager::LifecycleManager;
use crate::notifier::Notifier;

/// Runtime knobs for an [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub poll_interval: Duration,
    pub dispatch_timeout: Duration,
    /// `enviado_por` when the caller does not name anyone.
    pub sent_by: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
            sent_by: "notaria".to_string(),
        }
    }
}

/// A running engine.
pub struct Engine {
    manager: Arc<LifecycleManager>,
    dispatcher: NotificationDispatcher,
    poller: FeedPoller,
    sent_by: String,
}

impl Engine {
    /// Start polling `feed`. Must be called from within a tokio runtime.
    pub fn start(
        manager: Arc<LifecycleManager>,
        notifier: Arc<dyn Notifier>,
        feed: Arc<dyn DocumentFeed>,
        options: EngineOptions,
    ) -> Self {
        let dispatcher = NotificationDispatcher::new(Arc::clone(&manager), notifier)
            .with_timeout(options.dispatch_timeout);
        let poller = FeedPoller::spawn(feed, options.poll_interval);
        Self {
            manager,
            dispatcher,
            poller,
            sent_by: options.sent_by,
        }
    }

    pub fn manager(&self) -> &LifecycleManager {
        &self.manager
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    pub fn feed_snapshot(&self) -> Arc<FeedSnapshot> {
        self.poller.latest()
    }

    /// Receiver that wakes on every successful feed refresh.
    pub fn feed_updates(&self) -> watch::Receiver<Arc<FeedSnapshot>> {
        self.poller.subscribe()
    }

    /// Wait for the next successful feed refresh.
    pub async fn wait_for_feed(&mut self) -> bool {
        self.poller.changed().await
    }

    /// Which Pending cases are ready against the latest feed snapshot.
    pub fn readiness(&self) -> ReadinessSet {
        let snapshot = self.poller.latest();
        let pending = self.manager.list_pending();
        ReadinessSet::evaluate(pending.iter(), &snapshot.entries)
    }

    pub async fn dispatch_one(
        &self,
        case_id: Uuid,
        sent_by: Option<&str>,
    ) -> Result<Case, DispatchError> {
        self.dispatcher
            .dispatch_one(case_id, sent_by.unwrap_or(&self.sent_by))
            .await
    }

    /// Dispatch every case that is ready right now.
    pub async fn dispatch_ready(&self, sent_by: Option<&str>) -> DispatchReport {
        let ready = self.readiness();
        if ready.is_empty() {
            tracing::debug!("no document-ready cases to dispatch");
            return DispatchReport::default();
        }
        self.dispatcher
            .dispatch_all_ready(&ready, sent_by.unwrap_or(&self.sent_by))
            .await
    }

    /// Stop the feed poller and wait for it.
    pub async fn shutdown(self) {
        self.poller.shutdown().await;
        tracing::info!("engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::LogNotifier;
    use chrono::NaiveDate;
    use nt_case::{CaseStore, NewCase, ProtocolistRegistry};
    use nt_events::RecordingSink;
    use nt_feed::{DocumentFeedEntry, StaticFeed};

    #[tokio::test]
    async fn readiness_tracks_the_polled_feed() {
        let protocolists = ProtocolistRegistry::in_memory();
        protocolists.add("Ana", "ana@notaria.test").unwrap();
        let manager = Arc::new(LifecycleManager::new(
            Arc::new(CaseStore::in_memory()),
            Arc::new(protocolists),
            Arc::new(RecordingSink::new()),
        ));
        let case = manager
            .create_case(NewCase {
                fecha: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
                escritura: "7".to_string(),
                fecha_documento: None,
                radicado: "R-7".to_string(),
                protocolista: "Ana".to_string(),
                observaciones: String::new(),
            })
            .unwrap();

        let feed = Arc::new(StaticFeed::default());
        let mut engine = Engine::start(
            manager,
            Arc::new(LogNotifier),
            feed.clone(),
            EngineOptions {
                poll_interval: Duration::from_millis(10),
                ..EngineOptions::default()
            },
        );
        assert!(engine.wait_for_feed().await);
        assert!(engine.readiness().is_empty());
        assert!(engine.dispatch_ready(None).await.is_clean());

        feed.push(DocumentFeedEntry::new("R-7"));
        engine
            .feed_updates()
            .wait_for(|s| !s.entries.is_empty())
            .await
            .unwrap();
        assert!(engine.readiness().is_ready(case.case_id));

        let report = engine.dispatch_ready(None).await;
        assert_eq!(report.succeeded.len(), 1);
        let record = report.succeeded[0].last_dispatch.clone().unwrap();
        assert_eq!(record.enviado_por, "notaria");
        assert!(engine.readiness().is_empty());

        engine.shutdown().await;
    }
}
