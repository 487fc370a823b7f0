// dispatcher.rs - NotificationDispatcher: send one, or send every ready case.
//
// A case moves to Finished only after its notification was delivered. A
// failure, a timeout or a store refusal leaves the case exactly as it was and
// is returned to the caller. Batch dispatch runs one task per case and joins
// them all; there is no batch-level rollback.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use nt_case::{Case, CaseError, DispatchRecord};
use nt_feed::ReadinessSet;
use serde::Serialize;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::manager::LifecycleManager;
use crate::notifier::{NotificationRequest, Notifier};

/// Default upper bound on one send.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Performs dispatches. Clones share the same collaborators.
#[derive(Clone)]
pub struct NotificationDispatcher {
    manager: Arc<LifecycleManager>,
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

/// Marks a case as being dispatched until dropped.
struct InFlight {
    case_id: Uuid,
    set: Arc<Mutex<HashSet<Uuid>>>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.case_id);
    }
}

impl NotificationDispatcher {
    pub fn new(manager: Arc<LifecycleManager>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            manager,
            notifier,
            timeout: DEFAULT_DISPATCH_TIMEOUT,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn manager(&self) -> &LifecycleManager {
        &self.manager
    }

    /// Notify about one Pending case and, on success, move it to Finished.
    ///
    /// Readiness is not checked here; an operator may dispatch any Pending
    /// case by hand.
    pub async fn dispatch_one(&self, case_id: Uuid, sent_by: &str) -> Result<Case, DispatchError> {
        // Claim before reading, so the state checked below is the state this
        // call sends for.
        let _guard = self.claim(case_id)?;
        let case = self
            .manager
            .get(case_id)
            .ok_or(CaseError::NotFound(case_id))?;
        if !case.is_pending() {
            return Err(CaseError::Conflict {
                case_id,
                state: case.state.to_string(),
                operation: "dispatch",
            }
            .into());
        }

        let request = self.request_for(&case, sent_by)?;
        let seconds = self.timeout.as_secs();
        match tokio::time::timeout(self.timeout, self.notifier.send(&request)).await {
            Ok(Ok(())) => {}
            Ok(Err(source)) => {
                tracing::warn!(
                    "dispatch of case {} (radicado {}) via {} failed: {}",
                    case_id,
                    request.radicado,
                    self.notifier.name(),
                    source
                );
                return Err(DispatchError::Notification {
                    case_id,
                    radicado: request.radicado,
                    source,
                });
            }
            Err(_) => {
                tracing::warn!(
                    "dispatch of case {} (radicado {}) via {} timed out after {}s",
                    case_id,
                    request.radicado,
                    self.notifier.name(),
                    seconds
                );
                return Err(DispatchError::Timeout {
                    case_id,
                    radicado: request.radicado,
                    seconds,
                });
            }
        }

        let record = DispatchRecord::new(request.recipient, request.sent_by);
        let finished = self.manager.complete_dispatch(case_id, record)?;
        Ok(finished)
    }

    /// Dispatch every case in `ready` concurrently and report each outcome.
    pub async fn dispatch_all_ready(&self, ready: &ReadinessSet, sent_by: &str) -> DispatchReport {
        let mut tasks = JoinSet::new();
        let mut outstanding: BTreeMap<Uuid, String> = BTreeMap::new();
        for (case_id, radicado) in ready.iter() {
            outstanding.insert(case_id, radicado.to_string());
            let this = self.clone();
            let sent_by = sent_by.to_string();
            tasks.spawn(async move { (case_id, this.dispatch_one(case_id, &sent_by).await) });
        }

        let mut report = DispatchReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((case_id, result)) => {
                    let radicado = outstanding.remove(&case_id).unwrap_or_default();
                    match result {
                        Ok(case) => report.succeeded.push(case),
                        Err(error) => report.failed.push(DispatchFailure {
                            case_id,
                            radicado,
                            error,
                        }),
                    }
                }
                Err(e) => tracing::error!("dispatch task failed to complete: {}", e),
            }
        }
        // Whatever is left never reported back.
        for (case_id, radicado) in outstanding {
            report.failed.push(DispatchFailure {
                case_id,
                radicado,
                error: DispatchError::Aborted {
                    case_id,
                    reason: "task did not complete".to_string(),
                },
            });
        }

        report.succeeded.sort_by_key(|c| c.case_id);
        report.failed.sort_by_key(|f| f.case_id);
        tracing::info!(
            "batch dispatch: {} succeeded, {} failed",
            report.succeeded.len(),
            report.failed.len()
        );
        report
    }

    fn claim(&self, case_id: Uuid) -> Result<InFlight, CaseError> {
        let mut set = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(case_id) {
            return Err(CaseError::Conflict {
                case_id,
                state: "being dispatched".to_string(),
                operation: "dispatch",
            });
        }
        Ok(InFlight {
            case_id,
            set: Arc::clone(&self.in_flight),
        })
    }

    fn request_for(&self, case: &Case, sent_by: &str) -> Result<NotificationRequest, DispatchError> {
        let radicado = case
            .active_radicado()
            .ok_or(DispatchError::NoRadicado {
                case_id: case.case_id,
            })?
            .to_string();
        let protocolist = self
            .manager
            .protocolists()
            .find_by_name(&case.protocolista)
            .ok_or_else(|| DispatchError::NoRecipient {
                case_id: case.case_id,
                protocolista: case.protocolista.clone(),
            })?;
        Ok(NotificationRequest {
            case_id: case.case_id,
            radicado,
            escritura: case.escritura.clone(),
            protocolista: protocolist.nombre,
            recipient: protocolist.correo_electronico,
            sent_by: sent_by.to_string(),
        })
    }
}

/// One case that could not be dispatched.
#[derive(Debug)]
pub struct DispatchFailure {
    pub case_id: Uuid,
    pub radicado: String,
    pub error: DispatchError,
}

/// Per-case outcome of a batch dispatch.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub succeeded: Vec<Case>,
    pub failed: Vec<DispatchFailure>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn failed_ids(&self) -> Vec<Uuid> {
        self.failed.iter().map(|f| f.case_id).collect()
    }

    /// Serializable summary for logs and `--json` output.
    pub fn summary(&self) -> DispatchSummary {
        DispatchSummary {
            succeeded: self.succeeded.iter().map(|c| c.case_id).collect(),
            failed: self
                .failed
                .iter()
                .map(|f| FailureSummary {
                    case_id: f.case_id,
                    radicado: f.radicado.clone(),
                    error: f.error.to_string(),
                    retryable: f.error.is_retryable(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DispatchSummary {
    pub succeeded: Vec<Uuid>,
    pub failed: Vec<FailureSummary>,
}

#[derive(Debug, Serialize)]
pub struct FailureSummary {
    pub case_id: Uuid,
    pub radicado: String,
    pub error: String,
    pub retryable: bool,
}
