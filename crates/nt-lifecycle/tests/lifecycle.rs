// Integration: the full path from case creation through feed arrival,
// dispatch, observers and return to pending, on a store persisted to disk.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use nt_case::{CaseError, CaseStore, NewCase, ProtocolistRegistry};
use nt_events::{BroadcastHub, CaseEvent, EventDispatcher, LogSink, Observed};
use nt_feed::{DocumentFeedEntry, StaticFeed};
use nt_lifecycle::{
    DispatchError, Engine, EngineOptions, LifecycleManager, NotificationRequest, Notifier,
    NotifyError,
};
use tempfile::tempdir;

#[derive(Default)]
struct ScriptedNotifier {
    failing: Mutex<HashSet<String>>,
    delivered: Mutex<Vec<String>>,
}

impl ScriptedNotifier {
    fn fail_for(&self, radicado: &str) {
        self.failing.lock().unwrap().insert(radicado.to_string());
    }

    fn recover(&self, radicado: &str) {
        self.failing.lock().unwrap().remove(radicado);
    }
}

#[async_trait]
impl Notifier for ScriptedNotifier {
    async fn send(&self, request: &NotificationRequest) -> Result<(), NotifyError> {
        if self.failing.lock().unwrap().contains(&request.radicado) {
            return Err(NotifyError::Delivery("550 mailbox unavailable".to_string()));
        }
        self.delivered.lock().unwrap().push(request.radicado.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn new_case(escritura: &str, radicado: &str, protocolista: &str) -> NewCase {
    NewCase {
        fecha: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
        escritura: escritura.to_string(),
        fecha_documento: NaiveDate::from_ymd_opt(2024, 6, 28),
        radicado: radicado.to_string(),
        protocolista: protocolista.to_string(),
        observaciones: String::new(),
    }
}

fn next_event(sub: &mut nt_events::Subscription) -> CaseEvent {
    match sub.try_recv() {
        Some(Observed::Event(event)) => event,
        other => panic!("expected an event, got {:?}", other),
    }
}

#[tokio::test]
async fn end_to_end_dispatch_and_return() {
    let dir = tempdir().unwrap();
    let cases_dir = dir.path().join("cases");
    let events_log = dir.path().join("events.jsonl");

    let protocolists = ProtocolistRegistry::open(dir.path().join("protocolists.json")).unwrap();
    protocolists.add("Ana", "ana@notaria.test").unwrap();
    protocolists.add("Luis", "luis@notaria.test").unwrap();

    let hub = BroadcastHub::new();
    let mut observer = hub.subscribe();
    let broadcaster = EventDispatcher::new()
        .with_sink(LogSink::new(&events_log))
        .with_sink(hub.clone());

    let manager = Arc::new(LifecycleManager::new(
        Arc::new(CaseStore::open(&cases_dir).unwrap()),
        Arc::new(protocolists),
        Arc::new(broadcaster),
    ));
    let notifier = Arc::new(ScriptedNotifier::default());
    let feed = Arc::new(StaticFeed::default());
    let mut engine = Engine::start(
        Arc::clone(&manager),
        notifier.clone(),
        feed.clone(),
        EngineOptions {
            poll_interval: Duration::from_millis(10),
            dispatch_timeout: Duration::from_secs(1),
            sent_by: "recepcion".to_string(),
        },
    );
    assert!(engine.wait_for_feed().await);

    // Case A opened with radicado 1001.
    let a = manager.create_case(new_case("1520", "1001", "Ana")).unwrap();
    assert_eq!(next_event(&mut observer).event_type(), "case_created");
    assert!(!engine.readiness().is_ready(a.case_id));

    // Its document arrives.
    feed.push(DocumentFeedEntry::new(" 1001 ").with_filename("esc-1520.pdf"));
    engine
        .feed_updates()
        .wait_for(|s| !s.entries.is_empty())
        .await
        .unwrap();
    assert!(engine.readiness().is_ready(a.case_id));

    // Dispatch succeeds: A leaves pending with envios = 1.
    let finished = engine.dispatch_one(a.case_id, None).await.unwrap();
    assert_eq!(finished.envios, 1);
    assert!(manager.list_pending().is_empty());
    let listed = manager.list_finished();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].correo_enviado_a, "ana@notaria.test");
    assert_eq!(listed[0].enviado_por, "recepcion");

    match next_event(&mut observer) {
        CaseEvent::CaseMoved {
            case_id,
            radicado,
            to_state,
            envios,
            ..
        } => {
            assert_eq!(case_id, a.case_id);
            assert_eq!(radicado, "1001");
            assert_eq!(to_state, "finished");
            assert_eq!(envios, 1);
        }
        other => panic!("expected case_moved, got {:?}", other),
    }

    // A new case may reuse 1001 now that A is finished...
    let b = manager.create_case(new_case("1600", "1001", "Luis")).unwrap();
    // ...which blocks A from returning until B moves on.
    assert!(matches!(
        manager.return_to_pending(a.case_id),
        Err(CaseError::DuplicateRadicado { .. })
    ));
    manager.delete_case(b.case_id).unwrap();

    let returned = manager.return_to_pending(a.case_id).unwrap();
    assert_eq!(returned.envios, 1);
    assert_eq!(returned.escritura, "1520");

    let again = engine.dispatch_one(a.case_id, Some("archivo")).await.unwrap();
    assert_eq!(again.envios, 2);
    assert_eq!(notifier.delivered.lock().unwrap().len(), 2);

    engine.shutdown().await;

    // Everything survived on disk, including the event log.
    let reopened = CaseStore::open(&cases_dir).unwrap();
    let a_on_disk = reopened.get(a.case_id).unwrap();
    assert_eq!(a_on_disk.envios, 2);
    assert_eq!(
        a_on_disk.last_dispatch.unwrap().enviado_por,
        "archivo"
    );
    let log = std::fs::read_to_string(&events_log).unwrap();
    let types: Vec<String> = log
        .lines()
        .map(|line| serde_json::from_str::<CaseEvent>(line).unwrap().event_type().to_string())
        .collect();
    assert_eq!(
        types,
        vec![
            "case_created",
            "case_moved",
            "case_created",
            "case_deleted",
            "case_moved",
            "case_moved"
        ]
    );
}

#[tokio::test]
async fn batch_with_one_failure_and_retry() {
    let protocolists = ProtocolistRegistry::in_memory();
    protocolists.add("Ana", "ana@notaria.test").unwrap();
    let manager = Arc::new(LifecycleManager::new(
        Arc::new(CaseStore::in_memory()),
        Arc::new(protocolists),
        Arc::new(BroadcastHub::new()),
    ));
    let notifier = Arc::new(ScriptedNotifier::default());
    notifier.fail_for("R-3");

    let ids: Vec<_> = (1..=5)
        .map(|i| {
            manager
                .create_case(new_case(&i.to_string(), &format!("R-{}", i), "Ana"))
                .unwrap()
                .case_id
        })
        .collect();
    let feed = Arc::new(StaticFeed::new(
        (1..=5)
            .map(|i| DocumentFeedEntry::new(format!("R-{}", i)))
            .collect(),
    ));
    let mut engine = Engine::start(
        Arc::clone(&manager),
        notifier.clone(),
        feed,
        EngineOptions {
            poll_interval: Duration::from_millis(10),
            ..EngineOptions::default()
        },
    );
    assert!(engine.wait_for_feed().await);
    assert_eq!(engine.readiness().len(), 5);

    let report = engine.dispatch_ready(None).await;
    assert_eq!(report.succeeded.len(), 4);
    assert_eq!(report.failed_ids(), vec![ids[2]]);
    assert!(matches!(
        report.failed[0].error,
        DispatchError::Notification { .. }
    ));
    assert_eq!(manager.list_pending().len(), 1);
    assert_eq!(manager.get(ids[2]).unwrap().envios, 0);

    // Only the failed case is still ready; a retry picks it up alone.
    notifier.recover("R-3");
    let retry = engine.dispatch_ready(None).await;
    assert_eq!(retry.succeeded.len(), 1);
    assert!(retry.is_clean());
    assert!(manager.list_pending().is_empty());
    assert_eq!(manager.list_finished().len(), 5);

    engine.shutdown().await;
}
