// hub.rs - Live fan-out to any number of in-process observers.
//
// Uses `tokio::sync::broadcast` for multi-consumer delivery. There is no
// replay: a subscriber only sees events published after it subscribed, and
// a subscriber that falls behind the channel capacity is told to resync
// (pull a full listing) instead of receiving the dropped events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::dispatch::{Broadcaster, EventSink};
use crate::error::EventError;
use crate::event::CaseEvent;

/// Events buffered per subscriber before it is considered lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// What an observer gets from its subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    /// The next event.
    Event(CaseEvent),

    /// `missed` events were dropped; refetch full state.
    Resync { missed: u64 },
}

/// In-memory broadcast hub. Clones publish into the same channel.
#[derive(Clone)]
pub struct BroadcastHub {
    sender: broadcast::Sender<CaseEvent>,
    published: Arc<AtomicU64>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Total events published through this hub.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for BroadcastHub {
    fn send(&self, event: &CaseEvent) -> Result<(), EventError> {
        self.published.fetch_add(1, Ordering::Relaxed);
        match self.sender.send(event.clone()) {
            Ok(receivers) => {
                tracing::debug!("{} delivered to {} subscriber(s)", event.event_type(), receivers)
            }
            // No subscribers right now; nothing to deliver.
            Err(_) => tracing::debug!("{} dropped (no subscribers)", event.event_type()),
        }
        Ok(())
    }
}

impl Broadcaster for BroadcastHub {
    fn broadcast(&self, event: CaseEvent) {
        let _ = self.send(&event);
    }
}

/// One observer's handle on the hub.
pub struct Subscription {
    receiver: broadcast::Receiver<CaseEvent>,
}

impl Subscription {
    /// Wait for the next event. `None` once every publisher is gone.
    pub async fn recv(&mut self) -> Option<Observed> {
        match self.receiver.recv().await {
            Ok(event) => Some(Observed::Event(event)),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::debug!("subscriber lagged, {} event(s) dropped", missed);
                Some(Observed::Resync { missed })
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Non-blocking variant of [`Subscription::recv`]. `None` when nothing
    /// is waiting or the hub is gone.
    pub fn try_recv(&mut self) -> Option<Observed> {
        match self.receiver.try_recv() {
            Ok(event) => Some(Observed::Event(event)),
            Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                Some(Observed::Resync { missed })
            }
            Err(_) => None,
        }
    }
}
