// context.rs - Opens the on-disk store, registry and event log for a command.

use std::sync::Arc;

use nt_case::{CaseStore, ProtocolistRegistry};
use nt_events::{EventDispatcher, LogSink};
use nt_lifecycle::{LifecycleManager, NotariaConfig};

/// Everything a command needs to read or change cases.
pub struct Context {
    pub manager: Arc<LifecycleManager>,
}

impl Context {
    /// Events go to the shared JSONL log only; `watch` follows that log, so it
    /// sees changes from every process.
    pub fn open(config: &NotariaConfig) -> anyhow::Result<Self> {
        let store = CaseStore::open(&config.cases_dir)?;
        let protocolists = ProtocolistRegistry::open(&config.protocolists_file)?;
        let broadcaster = EventDispatcher::new().with_sink(LogSink::new(&config.events_log));
        let manager = LifecycleManager::new(
            Arc::new(store),
            Arc::new(protocolists),
            Arc::new(broadcaster),
        );
        Ok(Self {
            manager: Arc::new(manager),
        })
    }
}
