// store.rs - CaseStore: the single authority for case records.
//
// Each case is stored as a JSON file: `<cases_dir>/<case_id>.json`. The store
// keeps the records in memory together with an index of the uniqueness keys
// held by Pending cases:
//   - active radicado         (no two Pending cases share one)
//   - escritura + document date (no two Pending cases share one)
//
// Other processes may write the same directory, so a file-backed store
// re-reads it on every call. Writes hold the in-process mutex and an
// exclusive lock on `<cases_dir>/.lock` across the re-read, the duplicate
// check and the disk write. Reads hold a shared lock. The disk write happens
// before the in-memory commit; if it fails nothing changes.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use crate::case::{
    normalize_radicado, Case, CaseState, CaseUpdate, DispatchRecord, DocumentKey, FinishedCase,
    NewCase, Radicado,
};
use crate::error::CaseError;
use crate::lock::{io_error, write_atomic, FileLock, LockMode};

/// Lock file inside the cases directory. Not a `.json` file, so never loaded.
const LOCK_FILE: &str = ".lock";

/// Uniqueness keys currently held by Pending cases.
#[derive(Debug, Default)]
struct PendingIndex {
    radicados: HashMap<String, Uuid>,
    documents: HashMap<DocumentKey, Uuid>,
}

impl PendingIndex {
    fn insert(&mut self, case: &Case) {
        if !case.is_pending() {
            return;
        }
        if let Some(radicado) = case.active_radicado() {
            if let Some(previous) = self.radicados.insert(radicado.to_string(), case.case_id) {
                if previous != case.case_id {
                    tracing::warn!(
                        "radicado {} indexed for both {} and {}",
                        radicado,
                        previous,
                        case.case_id
                    );
                }
            }
        }
        if let Some(key) = case.document_key() {
            self.documents.insert(key, case.case_id);
        }
    }

    fn remove(&mut self, case: &Case) {
        if let Some(radicado) = case.active_radicado() {
            if self.radicados.get(radicado) == Some(&case.case_id) {
                self.radicados.remove(radicado);
            }
        }
        if let Some(key) = case.document_key() {
            if self.documents.get(&key) == Some(&case.case_id) {
                self.documents.remove(&key);
            }
        }
    }
}

#[derive(Default)]
struct StoreState {
    cases: HashMap<Uuid, Case>,
    pending: PendingIndex,
}

impl StoreState {
    /// Read every `*.json` record in `dir`.
    fn load(dir: &Path) -> Result<Self, CaseError> {
        let mut state = StoreState::default();
        for entry in fs::read_dir(dir).map_err(io_error(dir))? {
            let path = entry.map_err(io_error(dir))?.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            let json = match fs::read_to_string(&path) {
                Ok(json) => json,
                // Deleted by another process between listing and reading.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(io_error(&path)(e)),
            };
            match serde_json::from_str::<Case>(&json) {
                Ok(case) => state.replace(case),
                Err(e) => tracing::warn!("skipping unreadable case file {}: {}", path.display(), e),
            }
        }
        Ok(state)
    }

    fn get(&self, case_id: Uuid) -> Result<Case, CaseError> {
        self.cases
            .get(&case_id)
            .cloned()
            .ok_or(CaseError::NotFound(case_id))
    }

    /// Check both uniqueness keys of `candidate` against every other Pending case.
    fn check_unique(&self, candidate: &Case) -> Result<(), CaseError> {
        if !candidate.is_pending() {
            return Ok(());
        }
        if let Some(radicado) = candidate.active_radicado() {
            if let Some(other) = self.conflicting(self.pending.radicados.get(radicado), candidate) {
                return Err(CaseError::DuplicateRadicado {
                    radicado: radicado.to_string(),
                    conflicting_case: other.case_id,
                    protocolista: other.protocolista.clone(),
                });
            }
        }
        if let Some(key) = candidate.document_key() {
            if let Some(other) = self.conflicting(self.pending.documents.get(&key), candidate) {
                return Err(CaseError::DuplicateDocument {
                    escritura: candidate.escritura.clone(),
                    fecha_documento: key.fecha_documento.to_string(),
                    conflicting_case: other.case_id,
                    protocolista: other.protocolista.clone(),
                });
            }
        }
        Ok(())
    }

    fn conflicting(&self, holder: Option<&Uuid>, candidate: &Case) -> Option<&Case> {
        holder
            .filter(|id| **id != candidate.case_id)
            .and_then(|id| self.cases.get(id))
    }

    fn replace(&mut self, case: Case) {
        if let Some(old) = self.cases.get(&case.case_id) {
            self.pending.remove(old);
        }
        self.pending.insert(&case);
        self.cases.insert(case.case_id, case);
    }
}

/// Persistent store for case records.
pub struct CaseStore {
    cases_dir: Option<PathBuf>,
    state: Mutex<StoreState>,
}

impl CaseStore {
    /// A store that keeps everything in memory.
    pub fn in_memory() -> Self {
        Self {
            cases_dir: None,
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Open a store backed by `cases_dir`, creating the directory if needed
    /// and loading every record already in it.
    pub fn open(cases_dir: impl AsRef<Path>) -> Result<Self, CaseError> {
        let cases_dir = cases_dir.as_ref().to_path_buf();
        fs::create_dir_all(&cases_dir).map_err(io_error(&cases_dir))?;

        let state = {
            let _dir_lock = FileLock::acquire(&cases_dir.join(LOCK_FILE), LockMode::Shared)?;
            StoreState::load(&cases_dir)?
        };
        tracing::debug!(
            "case store opened at {} with {} case(s)",
            cases_dir.display(),
            state.cases.len()
        );

        Ok(Self {
            cases_dir: Some(cases_dir),
            state: Mutex::new(state),
        })
    }

    /// Open a new Pending case.
    pub fn create(&self, fields: NewCase) -> Result<Case, CaseError> {
        let case = Case::new(fields)?;
        self.write_txn(|state| {
            state.check_unique(&case)?;
            self.write(&case)?;
            state.replace(case.clone());
            Ok(case)
        })
    }

    /// Apply a partial edit to a Pending case.
    ///
    /// Returns the resulting case and the names of the fields that changed.
    /// Nothing is written when no field changed.
    pub fn update(
        &self,
        case_id: Uuid,
        update: &CaseUpdate,
    ) -> Result<(Case, Vec<&'static str>), CaseError> {
        self.write_txn(|state| {
            let mut case = state.get(case_id)?;
            case.ensure_pending("update")?;

            let changed = update.apply(&mut case)?;
            if changed.is_empty() {
                return Ok((case, changed));
            }
            state.check_unique(&case)?;
            self.write(&case)?;
            state.replace(case.clone());
            Ok((case, changed))
        })
    }

    /// Append a radicado to a Pending case, making it the active one.
    ///
    /// Returns the case and whether the history grew.
    pub fn add_radicado(&self, case_id: Uuid, value: &str) -> Result<(Case, bool), CaseError> {
        self.write_txn(|state| {
            let mut case = state.get(case_id)?;
            case.ensure_pending("add a radicado to")?;

            if !case.push_radicado(value)? {
                return Ok((case, false));
            }
            state.check_unique(&case)?;
            self.write(&case)?;
            state.replace(case.clone());
            Ok((case, true))
        })
    }

    /// Remove a case and its radicado history, whatever its state.
    pub fn delete(&self, case_id: Uuid) -> Result<Case, CaseError> {
        self.write_txn(|state| {
            if !state.cases.contains_key(&case_id) {
                return Err(CaseError::NotFound(case_id));
            }
            if let Some(path) = self.case_file(case_id) {
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(io_error(&path)(e)),
                }
            }
            let case = state
                .cases
                .remove(&case_id)
                .ok_or(CaseError::NotFound(case_id))?;
            state.pending.remove(&case);
            Ok(case)
        })
    }

    /// Pending → Finished after a successful dispatch: `envios` grows by one
    /// and the audit record is stored.
    pub fn record_dispatch(
        &self,
        case_id: Uuid,
        record: DispatchRecord,
    ) -> Result<Case, CaseError> {
        self.write_txn(|state| {
            let mut case = state.get(case_id)?;
            case.ensure_pending("dispatch")?;

            case.transition(CaseState::Finished)?;
            case.envios += 1;
            case.last_dispatch = Some(record);
            self.write(&case)?;
            state.replace(case.clone());
            Ok(case)
        })
    }

    /// Finished → Pending. Every field, `envios` included, is kept.
    ///
    /// The returned case must not collide with a case that became Pending in
    /// the meantime.
    pub fn reopen(&self, case_id: Uuid) -> Result<Case, CaseError> {
        self.write_txn(|state| {
            let mut case = state
                .cases
                .get(&case_id)
                .filter(|c| c.state == CaseState::Finished)
                .cloned()
                .ok_or(CaseError::NotFound(case_id))?;

            case.transition(CaseState::Pending)?;
            state.check_unique(&case)?;
            self.write(&case)?;
            state.replace(case.clone());
            Ok(case)
        })
    }

    /// Get a case by id.
    pub fn get(&self, case_id: Uuid) -> Option<Case> {
        self.read(|state| state.cases.get(&case_id).cloned())
    }

    /// Every case, newest first.
    pub fn list(&self) -> Vec<Case> {
        let mut cases: Vec<Case> = self.read(|state| state.cases.values().cloned().collect());
        cases.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        cases
    }

    /// Pending cases, newest first.
    pub fn list_pending(&self) -> Vec<Case> {
        self.list().into_iter().filter(Case::is_pending).collect()
    }

    /// Finished cases with their dispatch audit, most recently dispatched first.
    pub fn list_finished(&self) -> Vec<FinishedCase> {
        let mut finished: Vec<FinishedCase> = self
            .list()
            .into_iter()
            .filter(|c| c.state == CaseState::Finished)
            .filter_map(|c| {
                let case_id = c.case_id;
                FinishedCase::try_from(c)
                    .inspect_err(|e| tracing::warn!("case {} not listable: {}", case_id, e))
                    .ok()
            })
            .collect();
        finished.sort_by(|a, b| b.hora_envio.cmp(&a.hora_envio));
        finished
    }

    /// Full radicado history of a case, oldest first.
    pub fn history(&self, case_id: Uuid) -> Result<Vec<Radicado>, CaseError> {
        self.read(|state| state.get(case_id).map(|c| c.radicados))
    }

    /// Case-info lookup by tracking number.
    ///
    /// A case whose active radicado matches wins (Pending before Finished);
    /// otherwise the newest case that carries the value in its history.
    pub fn find_by_radicado(&self, radicado: &str) -> Option<Case> {
        let needle = normalize_radicado(radicado)?;
        let cases = self.list();

        let mut active: Vec<&Case> = cases
            .iter()
            .filter(|c| c.active_radicado() == Some(needle))
            .collect();
        active.sort_by_key(|c| !c.is_pending());
        if let Some(case) = active.first() {
            return Some((*case).clone());
        }

        cases.into_iter().find(|c| c.has_radicado(needle))
    }

    pub fn len(&self) -> usize {
        self.read(|state| state.cases.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run a check-and-write against the committed state.
    fn write_txn<T>(
        &self,
        op: impl FnOnce(&mut StoreState) -> Result<T, CaseError>,
    ) -> Result<T, CaseError> {
        let mut state = self.lock();
        let _dir_lock = self.refresh(&mut *state, LockMode::Exclusive)?;
        op(&mut *state)
    }

    /// Run a read against the committed state, or against the last loaded
    /// state when the directory cannot be read.
    fn read<T>(&self, op: impl FnOnce(&StoreState) -> T) -> T {
        let mut state = self.lock();
        let _dir_lock = self
            .refresh(&mut *state, LockMode::Shared)
            .inspect_err(|e| tracing::warn!("case store not refreshed: {}", e))
            .ok()
            .flatten();
        op(&*state)
    }

    /// Reload from disk under the directory lock. The lock is returned so the
    /// caller holds it until its own write is on disk.
    fn refresh(
        &self,
        state: &mut StoreState,
        mode: LockMode,
    ) -> Result<Option<FileLock>, CaseError> {
        let Some(dir) = &self.cases_dir else {
            return Ok(None);
        };
        let lock = FileLock::acquire(&dir.join(LOCK_FILE), mode)?;
        *state = StoreState::load(dir)?;
        Ok(Some(lock))
    }

    fn write(&self, case: &Case) -> Result<(), CaseError> {
        let Some(path) = self.case_file(case.case_id) else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(case)?;
        write_atomic(&path, &json)
    }

    fn case_file(&self, case_id: Uuid) -> Option<PathBuf> {
        self.cases_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", case_id)))
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
