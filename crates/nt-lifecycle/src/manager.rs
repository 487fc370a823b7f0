// manager.rs - LifecycleManager: every case write, plus its broadcast.
//
// The store enforces the invariants; the manager adds the checks that need
// other collaborators (protocolist registry) and publishes a CaseEvent after
// each committed change. Events are only sent once the store write has
// succeeded, so observers never see a change that was rolled back.
//
// State machine:
//
//   Pending --(dispatch success)--> Finished
//   Finished --(return)--> Pending

use std::sync::Arc;

use nt_case::{
    Case, CaseError, CaseState, CaseStore, CaseUpdate, DispatchRecord, FinishedCase, NewCase,
    ProtocolistRegistry, Radicado,
};
use nt_events::{Broadcaster, CaseEvent};
use uuid::Uuid;

/// Owns the case lifecycle.
pub struct LifecycleManager {
    store: Arc<CaseStore>,
    protocolists: Arc<ProtocolistRegistry>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<CaseStore>,
        protocolists: Arc<ProtocolistRegistry>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            store,
            protocolists,
            broadcaster,
        }
    }

    pub fn store(&self) -> &CaseStore {
        &self.store
    }

    pub fn protocolists(&self) -> &ProtocolistRegistry {
        &self.protocolists
    }

    /// Open a new Pending case assigned to a registered protocolist.
    pub fn create_case(&self, fields: NewCase) -> Result<Case, CaseError> {
        self.protocolists.require(&fields.protocolista)?;
        let case = self.store.create(fields).inspect_err(|e| {
            if e.is_duplicate() {
                tracing::info!("case creation refused: {}", e);
            }
        })?;
        tracing::info!(
            "case {} created (radicado {}, escritura {})",
            case.case_id,
            radicado_of(&case),
            case.escritura
        );
        self.broadcaster
            .broadcast(CaseEvent::created(case.case_id, radicado_of(&case)));
        Ok(case)
    }

    /// Apply a partial edit. Nothing is broadcast when nothing changed.
    pub fn update_case(&self, case_id: Uuid, update: &CaseUpdate) -> Result<Case, CaseError> {
        if let Some(protocolista) = &update.protocolista {
            self.protocolists.require(protocolista)?;
        }
        let (case, changed) = self.store.update(case_id, update)?;
        if changed.is_empty() {
            tracing::debug!("case {} update changed nothing", case_id);
            return Ok(case);
        }
        tracing::info!("case {} updated: {}", case_id, changed.join(", "));
        self.broadcaster
            .broadcast(CaseEvent::updated(case_id, radicado_of(&case), &changed));
        Ok(case)
    }

    /// Append a radicado, making it the one matched against the feed.
    pub fn add_radicado(&self, case_id: Uuid, value: &str) -> Result<Case, CaseError> {
        let (case, added) = self.store.add_radicado(case_id, value)?;
        if !added {
            tracing::debug!("case {} already has radicado {} active", case_id, value.trim());
            return Ok(case);
        }
        tracing::info!(
            "case {} radicado {} added ({} in history)",
            case_id,
            radicado_of(&case),
            case.radicados.len()
        );
        self.broadcaster
            .broadcast(CaseEvent::updated(case_id, radicado_of(&case), &["radicado"]));
        Ok(case)
    }

    /// Remove a case regardless of state.
    pub fn delete_case(&self, case_id: Uuid) -> Result<Case, CaseError> {
        let case = self.store.delete(case_id)?;
        tracing::info!("case {} deleted (state {})", case_id, case.state);
        self.broadcaster
            .broadcast(CaseEvent::deleted(case_id, radicado_of(&case)));
        Ok(case)
    }

    /// Pending → Finished. Only the dispatcher calls this, after the
    /// notification channel reported success.
    pub fn complete_dispatch(
        &self,
        case_id: Uuid,
        record: DispatchRecord,
    ) -> Result<Case, CaseError> {
        let case = self.store.record_dispatch(case_id, record)?;
        tracing::info!(
            "case {} finished (envios {}, sent to {})",
            case_id,
            case.envios,
            case.last_dispatch
                .as_ref()
                .map(|d| d.correo_enviado_a.as_str())
                .unwrap_or_default()
        );
        self.broadcaster.broadcast(CaseEvent::moved(
            case_id,
            radicado_of(&case),
            CaseState::Pending,
            CaseState::Finished,
            case.envios,
        ));
        Ok(case)
    }

    /// Finished → Pending. Fields and `envios` are kept.
    ///
    /// Fails with `NotFound` unless the case exists and is Finished, and with
    /// a duplicate error if a Pending case now holds its radicado or deed.
    pub fn return_to_pending(&self, case_id: Uuid) -> Result<Case, CaseError> {
        let case = self.store.reopen(case_id)?;
        tracing::info!("case {} returned to pending (envios {})", case_id, case.envios);
        self.broadcaster.broadcast(CaseEvent::moved(
            case_id,
            radicado_of(&case),
            CaseState::Finished,
            CaseState::Pending,
            case.envios,
        ));
        Ok(case)
    }

    pub fn get(&self, case_id: Uuid) -> Option<Case> {
        self.store.get(case_id)
    }

    pub fn list_pending(&self) -> Vec<Case> {
        self.store.list_pending()
    }

    pub fn list_finished(&self) -> Vec<FinishedCase> {
        self.store.list_finished()
    }

    /// Case-info lookup by tracking number.
    pub fn case_info(&self, radicado: &str) -> Option<Case> {
        self.store.find_by_radicado(radicado)
    }

    pub fn radicado_history(&self, case_id: Uuid) -> Result<Vec<Radicado>, CaseError> {
        self.store.history(case_id)
    }
}

fn radicado_of(case: &Case) -> &str {
    case.active_radicado().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use nt_events::RecordingSink;

    fn manager() -> (LifecycleManager, RecordingSink) {
        let protocolists = ProtocolistRegistry::in_memory();
        protocolists.add("Ana", "ana@notaria.test").unwrap();
        protocolists.add("Luis", "luis@notaria.test").unwrap();
        let recorder = RecordingSink::new();
        let manager = LifecycleManager::new(
            Arc::new(CaseStore::in_memory()),
            Arc::new(protocolists),
            Arc::new(recorder.clone()),
        );
        (manager, recorder)
    }

    fn new_case(escritura: &str, radicado: &str) -> NewCase {
        NewCase {
            fecha: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            escritura: escritura.to_string(),
            fecha_documento: NaiveDate::from_ymd_opt(2024, 5, 30),
            radicado: radicado.to_string(),
            protocolista: "Ana".to_string(),
            observaciones: String::new(),
        }
    }

    #[test]
    fn create_broadcasts_case_created() {
        let (manager, recorder) = manager();
        let case = manager.create_case(new_case("100", "R-1")).unwrap();
        let events = recorder.of_type("case_created");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].case_id(), case.case_id);
        assert_eq!(events[0].radicado(), "R-1");
    }

    #[test]
    fn unknown_protocolist_is_a_validation_error() {
        let (manager, recorder) = manager();
        let mut fields = new_case("100", "R-1");
        fields.protocolista = "Nadie".to_string();
        assert!(matches!(
            manager.create_case(fields),
            Err(CaseError::Validation { field: "protocolista", .. })
        ));
        assert!(manager.store().is_empty());
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn duplicate_names_the_conflicting_protocolist() {
        let (manager, recorder) = manager();
        manager.create_case(new_case("100", "R-1")).unwrap();
        let mut other = new_case("200", "R-1");
        other.protocolista = "Luis".to_string();
        match manager.create_case(other) {
            Err(CaseError::DuplicateRadicado { protocolista, .. }) => {
                assert_eq!(protocolista, "Ana")
            }
            other => panic!("expected DuplicateRadicado, got {:?}", other),
        }
        assert_eq!(manager.store().len(), 1);
        assert_eq!(recorder.events().len(), 1);
    }

    #[test]
    fn noop_update_does_not_broadcast() {
        let (manager, recorder) = manager();
        let case = manager.create_case(new_case("100", "R-1")).unwrap();
        let update = CaseUpdate {
            escritura: Some("100".to_string()),
            ..CaseUpdate::default()
        };
        manager.update_case(case.case_id, &update).unwrap();
        assert!(recorder.of_type("case_updated").is_empty());

        let update = CaseUpdate {
            observaciones: Some("firma pendiente".to_string()),
            protocolista: Some("Luis".to_string()),
            ..CaseUpdate::default()
        };
        manager.update_case(case.case_id, &update).unwrap();
        let updated = recorder.of_type("case_updated");
        assert_eq!(updated.len(), 1);
    }

    #[test]
    fn update_to_unknown_protocolist_is_refused() {
        let (manager, _) = manager();
        let case = manager.create_case(new_case("100", "R-1")).unwrap();
        let update = CaseUpdate {
            protocolista: Some("Nadie".to_string()),
            ..CaseUpdate::default()
        };
        assert!(manager.update_case(case.case_id, &update).is_err());
        assert_eq!(manager.get(case.case_id).unwrap().protocolista, "Ana");
    }

    #[test]
    fn second_radicado_becomes_active_and_history_is_kept() {
        let (manager, recorder) = manager();
        let case = manager.create_case(new_case("100", "R-1")).unwrap();
        let case = manager.add_radicado(case.case_id, "R-2").unwrap();
        assert_eq!(case.active_radicado(), Some("R-2"));

        let history = manager.radicado_history(case.case_id).unwrap();
        let values: Vec<&str> = history.iter().map(|r| r.value.as_str()).collect();
        assert_eq!(values, vec!["R-1", "R-2"]);
        assert_eq!(manager.case_info("R-1").unwrap().case_id, case.case_id);
        assert_eq!(recorder.of_type("case_updated")[0].radicado(), "R-2");
    }

    #[test]
    fn dispatch_then_return_keeps_envios() {
        let (manager, recorder) = manager();
        let case = manager.create_case(new_case("100", "R-1")).unwrap();

        manager
            .complete_dispatch(case.case_id, DispatchRecord::new("ana@notaria.test", "recepcion"))
            .unwrap();
        assert!(manager.list_pending().is_empty());
        let finished = manager.list_finished();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].case.envios, 1);
        assert_eq!(finished[0].correo_enviado_a, "ana@notaria.test");

        let returned = manager.return_to_pending(case.case_id).unwrap();
        assert_eq!(returned.envios, 1);
        assert_eq!(returned.escritura, "100");
        assert_eq!(manager.list_pending().len(), 1);

        manager
            .complete_dispatch(case.case_id, DispatchRecord::new("ana@notaria.test", "recepcion"))
            .unwrap();
        assert_eq!(manager.get(case.case_id).unwrap().envios, 2);
        assert_eq!(recorder.of_type("case_moved").len(), 3);
    }

    #[test]
    fn return_of_pending_case_is_not_found() {
        let (manager, recorder) = manager();
        let case = manager.create_case(new_case("100", "R-1")).unwrap();
        assert!(matches!(
            manager.return_to_pending(case.case_id),
            Err(CaseError::NotFound(_))
        ));
        assert!(matches!(
            manager.return_to_pending(Uuid::new_v4()),
            Err(CaseError::NotFound(_))
        ));
        assert!(recorder.of_type("case_moved").is_empty());
    }

    #[test]
    fn delete_broadcasts_and_removes() {
        let (manager, recorder) = manager();
        let case = manager.create_case(new_case("100", "R-1")).unwrap();
        manager.delete_case(case.case_id).unwrap();
        assert!(manager.get(case.case_id).is_none());
        assert_eq!(recorder.of_type("case_deleted").len(), 1);
        assert!(matches!(
            manager.delete_case(case.case_id),
            Err(CaseError::NotFound(_))
        ));
    }
}
