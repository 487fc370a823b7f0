// matcher.rs - Reconciliation: which Pending cases have their document.
//
// A case is document-ready iff some feed entry's trimmed radicado equals the
// case's trimmed active radicado. Absent or blank values never match. The
// feed radicados are collected into a set once per pass, so a pass costs
// O(cases + feed) rather than O(cases × feed).
//
// Evaluation is pure: it reads a snapshot of cases and entries and returns a
// set. It never touches the store.

use std::collections::{BTreeMap, HashSet};

use nt_case::Case;
use uuid::Uuid;

use crate::entry::DocumentFeedEntry;

/// Normalized radicados present in a feed.
pub fn feed_radicados(feed: &[DocumentFeedEntry]) -> HashSet<&str> {
    feed.iter()
        .filter_map(DocumentFeedEntry::normalized_radicado)
        .collect()
}

/// Readiness of a single case against a prepared lookup set.
pub fn is_document_ready(case: &Case, available: &HashSet<&str>) -> bool {
    case.active_radicado()
        .is_some_and(|radicado| available.contains(radicado))
}

/// The Pending cases found ready in one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadinessSet {
    /// case id → active radicado that matched.
    ready: BTreeMap<Uuid, String>,
}

impl ReadinessSet {
    /// Evaluate `cases` against `feed`. Cases that are not Pending are skipped.
    pub fn evaluate<'a>(
        cases: impl IntoIterator<Item = &'a Case>,
        feed: &[DocumentFeedEntry],
    ) -> Self {
        let available = feed_radicados(feed);
        let ready = cases
            .into_iter()
            .filter(|case| case.is_pending() && is_document_ready(case, &available))
            .filter_map(|case| {
                case.active_radicado()
                    .map(|radicado| (case.case_id, radicado.to_string()))
            })
            .collect();
        Self { ready }
    }

    pub fn is_ready(&self, case_id: Uuid) -> bool {
        self.ready.contains_key(&case_id)
    }

    /// The radicado that made `case_id` ready.
    pub fn radicado(&self, case_id: Uuid) -> Option<&str> {
        self.ready.get(&case_id).map(String::as_str)
    }

    pub fn case_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.ready.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Uuid, &str)> {
        self.ready.iter().map(|(id, r)| (*id, r.as_str()))
    }

    pub fn len(&self) -> usize {
        self.ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }

    /// Cases ready here that were not ready in `previous`.
    pub fn newly_ready(&self, previous: &ReadinessSet) -> Vec<Uuid> {
        self.case_ids()
            .filter(|id| !previous.is_ready(*id))
            .collect()
    }
}
