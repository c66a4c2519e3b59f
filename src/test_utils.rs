//! # Test Utilities
//!
//! Helpers shared by unit and integration tests: an in-memory queue wired to
//! a manual clock, handlers that record or fail on demand, and the Redis
//! opt-in switch.

use std::env;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;
use crate::events::Event;
use crate::messaging::clock::ManualClock;
use crate::messaging::connection::{ConnectionConfig, ConnectionManager};
use crate::messaging::in_memory::InMemoryConnector;
use crate::messaging::queue::EventQueue;
use crate::registry::handler::{EventHandler, HandlerError, HandlerResult};

/// Redis URL for tests that need a live server; those tests skip when unset
pub fn test_redis_url() -> Option<String> {
    env::var("TEST_REDIS_URL").ok()
}

/// Set `RELAY_ENV=test` unless already set
pub fn setup_test_environment() {
    if env::var("RELAY_ENV").is_err() {
        env::set_var("RELAY_ENV", "test");
    }
}

/// Connected in-memory queue plus handles to drive it
#[derive(Debug, Clone)]
pub struct InMemoryFixture {
    pub queue: Arc<EventQueue>,
    pub clock: Arc<ManualClock>,
    pub connector: InMemoryConnector,
}

/// Build and connect a queue named `name` over a fresh in-memory broker
pub async fn in_memory_queue(name: &str) -> Result<InMemoryFixture> {
    let connector = InMemoryConnector::default();
    let manager = Arc::new(ConnectionManager::new(
        Arc::new(connector.clone()),
        ConnectionConfig {
            max_retries: 1,
            retry_delay: Duration::from_millis(10),
            health_check_interval: Duration::from_secs(60),
        },
    ));
    let clock = Arc::new(ManualClock::new());
    let queue = Arc::new(EventQueue::new(name, manager, clock.clone()));

    queue.connect().await?;

    Ok(InMemoryFixture {
        queue,
        clock,
        connector,
    })
}

/// Poll `condition` every 10ms until it holds or `timeout` passes
pub async fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Handler that remembers every event it was given
#[derive(Debug, Default)]
pub struct RecordingHandler {
    name: String,
    seen: Mutex<Vec<Event>>,
}

impl RecordingHandler {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.seen.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.seen.lock().len()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &Event) -> HandlerResult {
        self.seen.lock().push(event.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Handler that fails its first `failures` calls, then succeeds
#[derive(Debug)]
pub struct FailingHandler {
    name: String,
    message: String,
    failures: u32,
    calls: AtomicU32,
}

impl FailingHandler {
    /// Fails on every call
    pub fn always(name: impl Into<String>, message: impl Into<String>) -> Arc<Self> {
        Self::times(name, message, u32::MAX)
    }

    pub fn times(name: impl Into<String>, message: impl Into<String>, failures: u32) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            message: message.into(),
            failures,
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventHandler for FailingHandler {
    async fn handle(&self, _event: &Event) -> HandlerResult {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(HandlerError::new(self.message.clone()))
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
