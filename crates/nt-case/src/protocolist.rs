// protocolist.rs - Protocolists: the staff handlers a case can be assigned to.
//
// Cases reference a protocolist by name, not by id. The registry is what
// create/update validate against and what the dispatcher asks for the
// recipient address at send time. Renaming or removing a protocolist does
// not rewrite the cases that carry the old name.
//
// Storage: a single JSON array file, rewritten on every change. Like the case
// store it is re-read on every call, under a lock on `<file>.lock`, so a
// long-running process sees protocolists added by other commands.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CaseError;
use crate::lock::{io_error, write_atomic, FileLock, LockMode};

/// A handler cases can be assigned to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Protocolist {
    pub id: Uuid,
    pub nombre: String,
    pub correo_electronico: String,
}

impl Protocolist {
    pub fn new(
        nombre: impl Into<String>,
        correo_electronico: impl Into<String>,
    ) -> Result<Self, CaseError> {
        let nombre = nombre.into().trim().to_string();
        let correo_electronico = correo_electronico.into().trim().to_string();
        validate_nombre(&nombre)?;
        validate_email(&correo_electronico)?;
        Ok(Self {
            id: Uuid::new_v4(),
            nombre,
            correo_electronico,
        })
    }
}

/// Registry of protocolists, optionally persisted to one JSON file.
pub struct ProtocolistRegistry {
    path: Option<PathBuf>,
    entries: Mutex<Vec<Protocolist>>,
}

impl ProtocolistRegistry {
    /// Registry that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Open (or create) a registry backed by `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CaseError> {
        let path = path.as_ref().to_path_buf();
        let entries = {
            let _file_lock = FileLock::acquire(&lock_path(&path), LockMode::Shared)?;
            load(&path)?
        };
        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    /// Register a new protocolist. Names are unique (case-insensitive).
    pub fn add(
        &self,
        nombre: impl Into<String>,
        correo_electronico: impl Into<String>,
    ) -> Result<Protocolist, CaseError> {
        let protocolist = Protocolist::new(nombre, correo_electronico)?;
        self.write_txn(|entries| {
            if entries
                .iter()
                .any(|p| p.nombre.eq_ignore_ascii_case(&protocolist.nombre))
            {
                return Err(CaseError::validation(
                    "nombre",
                    format!("protocolista '{}' already exists", protocolist.nombre),
                ));
            }
            let mut next = entries.clone();
            next.push(protocolist.clone());
            self.persist(&next)?;
            *entries = next;
            Ok(protocolist)
        })
    }

    /// Replace name and address of an existing protocolist.
    pub fn update(
        &self,
        id: Uuid,
        nombre: impl Into<String>,
        correo_electronico: impl Into<String>,
    ) -> Result<Protocolist, CaseError> {
        let nombre = nombre.into().trim().to_string();
        let correo_electronico = correo_electronico.into().trim().to_string();
        validate_nombre(&nombre)?;
        validate_email(&correo_electronico)?;

        self.write_txn(|entries| {
            if entries
                .iter()
                .any(|p| p.id != id && p.nombre.eq_ignore_ascii_case(&nombre))
            {
                return Err(CaseError::validation(
                    "nombre",
                    format!("protocolista '{}' already exists", nombre),
                ));
            }
            let mut next = entries.clone();
            let entry = next
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or(CaseError::NotFound(id))?;
            entry.nombre = nombre;
            entry.correo_electronico = correo_electronico;
            let updated = entry.clone();
            self.persist(&next)?;
            *entries = next;
            Ok(updated)
        })
    }

    /// Remove a protocolist. Returns `false` if the id is unknown.
    pub fn remove(&self, id: Uuid) -> Result<bool, CaseError> {
        self.write_txn(|entries| {
            if !entries.iter().any(|p| p.id == id) {
                return Ok(false);
            }
            let next: Vec<Protocolist> = entries.iter().filter(|p| p.id != id).cloned().collect();
            self.persist(&next)?;
            *entries = next;
            Ok(true)
        })
    }

    /// All protocolists, sorted by name.
    pub fn list(&self) -> Vec<Protocolist> {
        let mut all = self.read(|entries| entries.to_vec());
        all.sort_by(|a, b| a.nombre.to_lowercase().cmp(&b.nombre.to_lowercase()));
        all
    }

    /// Look up by name, ignoring surrounding whitespace and ASCII case.
    pub fn find_by_name(&self, nombre: &str) -> Option<Protocolist> {
        let nombre = nombre.trim();
        self.read(|entries| {
            entries
                .iter()
                .find(|p| p.nombre.eq_ignore_ascii_case(nombre))
                .cloned()
        })
    }

    /// Fail with a validation error when `nombre` is not registered.
    pub fn require(&self, nombre: &str) -> Result<Protocolist, CaseError> {
        self.find_by_name(nombre).ok_or_else(|| {
            CaseError::validation(
                "protocolista",
                format!("protocolista '{}' not found", nombre.trim()),
            )
        })
    }

    fn write_txn<T>(
        &self,
        op: impl FnOnce(&mut Vec<Protocolist>) -> Result<T, CaseError>,
    ) -> Result<T, CaseError> {
        let mut entries = self.lock();
        let _file_lock = self.refresh(&mut *entries, LockMode::Exclusive)?;
        op(&mut *entries)
    }

    fn read<T>(&self, op: impl FnOnce(&[Protocolist]) -> T) -> T {
        let mut entries = self.lock();
        let _file_lock = self
            .refresh(&mut *entries, LockMode::Shared)
            .inspect_err(|e| tracing::warn!("protocolist registry not refreshed: {}", e))
            .ok()
            .flatten();
        op(&entries[..])
    }

    fn refresh(
        &self,
        entries: &mut Vec<Protocolist>,
        mode: LockMode,
    ) -> Result<Option<FileLock>, CaseError> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        let lock = FileLock::acquire(&lock_path(path), mode)?;
        *entries = load(path)?;
        Ok(Some(lock))
    }

    fn persist(&self, entries: &[Protocolist]) -> Result<(), CaseError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(entries)?;
        write_atomic(path, &json)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Protocolist>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn lock_path(path: &Path) -> PathBuf {
    path.with_extension("lock")
}

fn load(path: &Path) -> Result<Vec<Protocolist>, CaseError> {
    match fs::read_to_string(path) {
        Ok(json) => Ok(serde_json::from_str(&json)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(io_error(path)(e)),
    }
}

fn validate_nombre(nombre: &str) -> Result<(), CaseError> {
    if nombre.is_empty() {
        return Err(CaseError::validation("nombre", "is required"));
    }
    Ok(())
}

fn validate_email(address: &str) -> Result<(), CaseError> {
    let mut parts = address.split('@');
    let valid = matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(local), Some(domain), None)
            if !local.is_empty() && !domain.is_empty() && !domain.contains(char::is_whitespace)
    );
    if valid {
        Ok(())
    } else {
        Err(CaseError::validation(
            "correo_electronico",
            format!("'{}' is not an email address", address),
        ))
    }
}
