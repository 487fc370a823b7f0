//! # nt-case
//!
//! Case records and the case store for the notaria case tracker.
//!
//! A [`Case`] is a notarial filing that moves from intake (Pending) to
//! dispatch (Finished). It carries an append-only history of tracking
//! numbers ([`Radicado`]); the last one is the active value used for
//! document matching.
//!
//! ## Key components
//!
//! - [`Case`] / [`CaseState`]: the record and its two-state lifecycle
//! - [`CaseStore`]: JSON file-based store that enforces the Pending
//!   uniqueness invariants (active radicado, escritura + document date),
//!   re-reading the directory under a file lock so several processes can
//!   share it
//! - [`ProtocolistRegistry`]: the handlers cases are assigned to by name
//! - [`CaseError`]: validation, duplicate, not-found and conflict errors

pub mod case;
pub mod error;
mod lock;
pub mod protocolist;
pub mod store;

pub use case::{
    normalize_radicado, parse_escritura, Case, CaseState, CaseUpdate, DispatchRecord,
    FinishedCase, NewCase, Radicado, NOT_FOUND_SENTINEL,
};
pub use error::CaseError;
pub use protocolist::{Protocolist, ProtocolistRegistry};
pub use store::CaseStore;
