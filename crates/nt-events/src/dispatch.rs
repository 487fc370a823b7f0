// dispatch.rs - Broadcaster capability, sinks and the fan-out dispatcher.
//
// The lifecycle manager depends on the `Broadcaster` trait only. Production
// wiring hands it an `EventDispatcher` that fans each event out to its sinks
// (JSONL log, live subscriber hub); tests hand it a recorder.
//
// Delivery is best-effort and fire-and-forget: a failing sink is logged and
// never fails the case operation that produced the event.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::EventError;
use crate::event::CaseEvent;

/// Publishes case changes to whoever is listening.
pub trait Broadcaster: Send + Sync {
    /// Publish an event. Never fails; delivery problems are logged.
    fn broadcast(&self, event: CaseEvent);
}

/// A destination for events.
pub trait EventSink: Send + Sync {
    /// Handle an event. Errors are logged but don't stop the system.
    fn send(&self, event: &CaseEvent) -> Result<(), EventError>;
}

/// Appends events as JSONL to a file.
pub struct LogSink {
    path: PathBuf,
}

impl LogSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl EventSink for LogSink {
    fn send(&self, event: &CaseEvent) -> Result<(), EventError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| EventError::IoError {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| EventError::IoError {
                path: self.path.display().to_string(),
                source,
            })?;

        // One write per line so appends from several processes never interleave.
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        file.write_all(line.as_bytes()).map_err(|source| EventError::IoError {
            path: self.path.display().to_string(),
            source,
        })?;

        Ok(())
    }
}

/// Keeps every event in memory. Clones share the same buffer.
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<CaseEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<CaseEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded events of one type.
    pub fn of_type(&self, event_type: &str) -> Vec<CaseEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn send(&self, event: &CaseEvent) -> Result<(), EventError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}

impl Broadcaster for RecordingSink {
    fn broadcast(&self, event: CaseEvent) {
        // Recording cannot fail.
        let _ = self.send(&event);
    }
}

/// Dispatches events to multiple sinks.
///
/// Errors from individual sinks are logged (via tracing) but don't
/// prevent other sinks from receiving the event.
#[derive(Default)]
pub struct EventDispatcher {
    sinks: Vec<Box<dyn EventSink>>,
}

impl EventDispatcher {
    /// Create a new dispatcher with no sinks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    /// Builder-style `add_sink`.
    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.add_sink(Box::new(sink));
        self
    }
}

impl Broadcaster for EventDispatcher {
    fn broadcast(&self, event: CaseEvent) {
        tracing::debug!(
            "broadcasting {} for case {} ({})",
            event.event_type(),
            event.case_id(),
            event.radicado()
        );
        for sink in &self.sinks {
            if let Err(e) = sink.send(&event) {
                tracing::warn!("event sink error: {}", e);
            }
        }
    }
}
