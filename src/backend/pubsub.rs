//! # Pub/Sub Backend
//!
//! Fire-and-forget transport with the publish/subscribe shape of the event
//! bus but none of its guarantees:
//!
//! - publishing while disconnected drops the event
//! - each backend buffers only events matching one of its own patterns;
//!   everything else is dropped on receipt
//! - a backend that falls more than the hub capacity behind loses the oldest
//!   events
//! - nothing is persisted, and nothing is shared with the durable queue
//!
//! Patterns here use [`MatchMode::Shell`] semantics, as broker-side channel
//! patterns do: `user.*` also matches `user.created.v2`.
//!
//! All backends attached to one [`PubSubHub`] see each other's events.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::constants::defaults;
use crate::error::{EventBusError, Result};
use crate::events::{Event, GlobPattern, MatchMode};

/// In-process fan-out point shared by backends
#[derive(Debug, Clone)]
pub struct PubSubHub {
    sender: broadcast::Sender<Event>,
}

impl PubSubHub {
    /// Create a hub whose receivers buffer up to `capacity` events each
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Number of connected backends
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn send(&self, event: Event) {
        // no receivers is fine for fire-and-forget
        let _ = self.sender.send(event);
    }

    fn receiver(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for PubSubHub {
    fn default() -> Self {
        Self::new(defaults::PUBSUB_CHANNEL_CAPACITY)
    }
}

#[derive(Debug, Default)]
struct BackendState {
    receiver: Option<broadcast::Receiver<Event>>,
    patterns: Vec<GlobPattern>,
}

/// One participant on a [`PubSubHub`]
#[derive(Debug)]
pub struct PubSubBackend {
    hub: Arc<PubSubHub>,
    state: Mutex<BackendState>,
}

impl PubSubBackend {
    pub fn new(hub: Arc<PubSubHub>) -> Self {
        Self {
            hub,
            state: Mutex::new(BackendState::default()),
        }
    }

    /// Attach to the hub. Events published before this call are not seen.
    pub fn connect(&self) {
        let mut state = self.state.lock();
        if state.receiver.is_none() {
            state.receiver = Some(self.hub.receiver());
            debug!(patterns = state.patterns.len(), "Pub/sub backend connected");
        }
    }

    /// Detach and drop everything buffered
    pub fn disconnect(&self) {
        if self.state.lock().receiver.take().is_some() {
            debug!("Pub/sub backend disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().receiver.is_some()
    }

    /// Broadcast an event. Returns the job id it was sent with, or `None` when
    /// it was dropped because this backend is disconnected.
    pub fn publish(&self, event: &Event) -> Result<Option<String>> {
        if event.name().is_empty() {
            return Err(EventBusError::validation("event name must not be empty"));
        }
        if !self.is_connected() {
            debug!(event = %event.name(), "Pub/sub backend disconnected, event dropped");
            return Ok(None);
        }

        let mut event = event.detached();
        let job_id = match event.job_id() {
            Some(job_id) => job_id.to_string(),
            None => {
                let job_id = Uuid::new_v4().to_string();
                event.assign_job_id(job_id.clone());
                job_id
            }
        };

        self.hub.send(event);
        Ok(Some(job_id))
    }

    /// Receive events whose name matches `pattern`
    pub fn subscribe(&self, pattern: &str) {
        let mut state = self.state.lock();
        if state.patterns.iter().all(|p| p.as_str() != pattern) {
            state.patterns.push(GlobPattern::new(pattern, MatchMode::Shell));
        }
    }

    /// Next buffered event matching a subscribed pattern, without waiting
    pub fn get(&self) -> Option<Event> {
        let mut state = self.state.lock();
        let state = &mut *state;
        let receiver = state.receiver.as_mut()?;

        loop {
            match receiver.try_recv() {
                Ok(event) => {
                    if state.patterns.iter().any(|p| p.matches(event.name())) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Pub/sub backend lagged, events lost");
                }
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => return None,
            }
        }
    }
}
