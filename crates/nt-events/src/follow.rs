// follow.rs - Follow the JSONL event log and republish it to a hub.
//
// Every `notaria` process appends its events to the same log through
// `LogSink`, so a long-running observer that follows the file sees changes
// made by any process, its own included. Following starts at the current end
// of the file: like the hub, there is no replay.
//
// A trailing line without its newline is held back until the rest arrives.
// A file that shrinks (truncated or replaced) is read again from the start.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::dispatch::Broadcaster;
use crate::error::EventError;
use crate::event::CaseEvent;
use crate::hub::BroadcastHub;

/// How often the log is checked for new lines by default.
pub const DEFAULT_FOLLOW_INTERVAL: Duration = Duration::from_millis(500);

/// Handle on the follow task.
pub struct LogFollower {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl LogFollower {
    /// Follow `path` from its current end, publishing every appended event
    /// to `hub`. Must be called from within a tokio runtime.
    pub fn spawn(path: impl AsRef<Path>, hub: BroadcastHub, interval: Duration) -> Self {
        let path = path.as_ref().to_path_buf();
        let offset = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let cursor = LogCursor {
            path,
            offset,
            partial: Vec::new(),
        };
        let handle = tokio::spawn(follow_loop(cursor, hub, interval, shutdown_rx));
        Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Stop following and wait for the task to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!("event log follower ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for LogFollower {
    fn drop(&mut self) {
        self.shutdown.take();
    }
}

/// Read position in the log plus any incomplete trailing line.
struct LogCursor {
    path: PathBuf,
    offset: u64,
    partial: Vec<u8>,
}

impl LogCursor {
    /// Events appended since the last call.
    async fn read_new(&mut self) -> Result<Vec<CaseEvent>, EventError> {
        let path = self.path.display().to_string();
        let io_err = |source| EventError::IoError {
            path: path.clone(),
            source,
        };
        let mut file = match tokio::fs::File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(e)),
        };
        let len = file.metadata().await.map_err(io_err)?.len();
        if len < self.offset {
            tracing::debug!("event log {} shrank, reading from the start", self.path.display());
            self.offset = 0;
            self.partial.clear();
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.offset))
            .await
            .map_err(io_err)?;
        let mut appended = Vec::new();
        file.read_to_end(&mut appended).await.map_err(io_err)?;
        self.offset += appended.len() as u64;
        self.partial.extend_from_slice(&appended);

        let mut events = Vec::new();
        while let Some(end) = self.partial.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.partial.drain(..=end).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<CaseEvent>(line) {
                Ok(event) => events.push(event),
                Err(e) => tracing::warn!("skipping unreadable event line: {}", e),
            }
        }
        Ok(events)
    }
}

async fn follow_loop(
    mut cursor: LogCursor,
    hub: BroadcastHub,
    interval: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::debug!("following event log {}", cursor.path.display());

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }
        match cursor.read_new().await {
            Ok(events) => {
                for event in events {
                    hub.broadcast(event);
                }
            }
            Err(e) => tracing::warn!("event log not readable: {}", e),
        }
    }

    tracing::debug!("stopped following event log {}", cursor.path.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{EventSink, LogSink};
    use crate::hub::Observed;
    use std::io::Write;
    use tempfile::tempdir;
    use uuid::Uuid;

    async fn next_event(sub: &mut crate::hub::Subscription) -> CaseEvent {
        match tokio::time::timeout(Duration::from_secs(5), sub.recv()).await {
            Ok(Some(Observed::Event(event))) => event,
            other => panic!("expected an event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn appended_events_reach_subscribers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let sink = LogSink::new(&path);
        sink.send(&CaseEvent::created(Uuid::new_v4(), "old")).unwrap();

        let hub = BroadcastHub::new();
        let mut sub = hub.subscribe();
        let follower = LogFollower::spawn(&path, hub.clone(), Duration::from_millis(10));

        // Written by "another process": a second sink on the same file.
        let other = LogSink::new(&path);
        let id = Uuid::new_v4();
        other.send(&CaseEvent::created(id, "1001")).unwrap();
        other.send(&CaseEvent::deleted(id, "1001")).unwrap();

        let first = next_event(&mut sub).await;
        assert_eq!(first.case_id(), id);
        assert_eq!(first.event_type(), "case_created");
        assert_eq!(next_event(&mut sub).await.event_type(), "case_deleted");

        follower.shutdown().await;
    }

    #[tokio::test]
    async fn incomplete_line_waits_for_its_newline() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let mut cursor = LogCursor {
            path: path.clone(),
            offset: 0,
            partial: Vec::new(),
        };
        assert!(cursor.read_new().await.unwrap().is_empty());

        let json = serde_json::to_string(&CaseEvent::created(Uuid::new_v4(), "7")).unwrap();
        let (head, tail) = json.split_at(10);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(head.as_bytes()).unwrap();
        assert!(cursor.read_new().await.unwrap().is_empty());

        writeln!(file, "{}", tail).unwrap();
        writeln!(file, "not json").unwrap();
        let events = cursor.read_new().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].radicado(), "7");
    }

    #[tokio::test]
    async fn truncated_log_is_read_from_the_start() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let sink = LogSink::new(&path);
        sink.send(&CaseEvent::created(Uuid::new_v4(), "1")).unwrap();
        sink.send(&CaseEvent::created(Uuid::new_v4(), "2")).unwrap();
        let mut cursor = LogCursor {
            path: path.clone(),
            offset: std::fs::metadata(&path).unwrap().len(),
            partial: Vec::new(),
        };

        std::fs::write(&path, "").unwrap();
        sink.send(&CaseEvent::created(Uuid::new_v4(), "3")).unwrap();
        let events = cursor.read_new().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].radicado(), "3");
    }
}
