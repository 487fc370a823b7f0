//! # nt-events
//!
//! Case change broadcasting for the notaria case tracker.
//!
//! Every create, edit, state move and delete produces a [`CaseEvent`]. The
//! engine publishes through the [`Broadcaster`] capability it is given, so
//! nothing depends on a process-wide connection.
//!
//! ## Key components
//!
//! - [`CaseEvent`]: `case_created`, `case_updated`, `case_moved`, `case_deleted`
//! - [`Broadcaster`]: what the lifecycle manager publishes through
//! - [`EventDispatcher`]: fans events out to [`EventSink`]s
//! - [`LogSink`]: JSONL event log
//! - [`BroadcastHub`]: live in-process subscribers (`tokio::sync::broadcast`)
//! - [`LogFollower`]: republishes the shared event log into a hub, so an
//!   observer sees changes made by other processes
//! - [`RecordingSink`]: in-memory recorder for tests and tooling

pub mod dispatch;
pub mod error;
pub mod event;
pub mod follow;
pub mod hub;

pub use dispatch::{Broadcaster, EventDispatcher, EventSink, LogSink, RecordingSink};
pub use error::EventError;
pub use event::CaseEvent;
pub use follow::{LogFollower, DEFAULT_FOLLOW_INTERVAL};
pub use hub::{BroadcastHub, Observed, Subscription, DEFAULT_CHANNEL_CAPACITY};
