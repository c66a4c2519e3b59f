//! # Event Bus
//!
//! Producer-facing facade. `publish` only enqueues; handlers run later on a
//! [`WorkerPool`] that shares this bus's queue and registry.
//!
//! ```rust,no_run
//! use relay_core::bus::EventBus;
//! use relay_core::events::Event;
//! use relay_core::registry::handler_fn;
//! use relay_core::worker::WorkerConfig;
//!
//! # async fn example(bus: EventBus) -> relay_core::error::Result<()> {
//! bus.subscribe("user.*", handler_fn("welcome", |event| async move {
//!     tracing::info!(user = ?event.data().get("id"), "welcome");
//!     Ok(())
//! }));
//!
//! bus.connect().await?;
//! let pool = bus.worker_pool(WorkerConfig::default());
//! pool.start();
//!
//! bus.publish(&Event::new("user.created", serde_json::json!({"id": "1"})), None).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::{EventBusError, Result};
use crate::events::Event;
use crate::messaging::queue::EventQueue;
use crate::registry::handler::HandlerRef;
use crate::registry::pattern_registry::PatternRegistry;
use crate::worker::pool::{WorkerConfig, WorkerPool};

#[derive(Debug, Clone)]
pub struct EventBus {
    queue: Arc<EventQueue>,
    registry: Arc<PatternRegistry>,
}

impl EventBus {
    pub fn new(queue: Arc<EventQueue>, registry: Arc<PatternRegistry>) -> Self {
        Self { queue, registry }
    }

    /// Bus with a fresh, empty registry
    pub fn with_queue(queue: Arc<EventQueue>) -> Self {
        Self::new(queue, Arc::new(PatternRegistry::new()))
    }

    /// Enqueue an event for asynchronous delivery.
    ///
    /// Connection failures are returned as [`EventBusError::Connection`];
    /// every other failure as [`EventBusError::Publish`] naming the event.
    pub async fn publish(&self, event: &Event, delay: Option<Duration>) -> Result<()> {
        match self.queue.push(event, delay).await {
            Ok(()) => {
                debug!(event = %event.name(), "Published event");
                Ok(())
            }
            Err(e @ EventBusError::Connection { .. }) => Err(e),
            Err(e) => Err(EventBusError::publish(event.name(), e.to_string())),
        }
    }

    pub fn subscribe(&self, pattern: &str, handler: HandlerRef) {
        self.registry.register(pattern, handler);
    }

    /// Remove one handler, or all handlers of `pattern` when `handler` is
    /// `None`. Returns how many were removed.
    pub fn unsubscribe(&self, pattern: &str, handler: Option<&HandlerRef>) -> usize {
        self.registry.unregister(pattern, handler)
    }

    pub async fn connect(&self) -> Result<()> {
        self.queue.connect().await
    }

    pub async fn disconnect(&self) {
        self.queue.disconnect().await
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    pub fn registry(&self) -> &Arc<PatternRegistry> {
        &self.registry
    }

    /// Worker pool consuming this bus's queue with this bus's registry
    pub fn worker_pool(&self, config: WorkerConfig) -> WorkerPool {
        WorkerPool::new(Arc::clone(&self.queue), Arc::clone(&self.registry), config)
    }
}
