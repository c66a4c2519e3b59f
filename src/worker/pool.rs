//! # Worker Pool
//!
//! Runs `num_workers` consumption loops against one [`EventQueue`], resolving
//! handlers through a shared [`PatternRegistry`].
//!
//! ## Loop
//!
//! 1. `pop_batch(batch_size, pop_timeout)`
//! 2. Empty batch or pop failure: sleep `poll_interval`, interruptible by
//!    [`WorkerPool::stop`]
//! 3. Otherwise dispatch every event of the batch concurrently
//!
//! ## Dispatch
//!
//! - No matching handler: acknowledge and warn
//! - All handlers succeed: acknowledge
//! - Any handler fails: while `metadata.retries < max_retries`, bump the
//!   counter and re-deliver after `retry_delay`; otherwise dead-letter with the
//!   error of the first failing handler in registration order
//!
//! Failures of one event, including a handler panic or a failed ack or nack,
//! are logged and never touch sibling events. A panic counts as a handler
//! failure. Loops end only through `stop()`.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::constants::defaults;
use crate::events::Event;
use crate::messaging::queue::EventQueue;
use crate::registry::handler::{HandlerError, HandlerRef, HandlerResult};
use crate::registry::pattern_registry::PatternRegistry;
use crate::resilience::backoff::{FixedDelay, RetryPolicy};
use crate::worker::stats::{WorkerStats, WorkerStatsSnapshot};

/// Worker pool settings
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Maximum events claimed per loop iteration
    pub batch_size: usize,
    /// Idle sleep after an empty batch or a failed pop
    pub poll_interval: Duration,
    /// How long the first claim of a batch may block
    pub pop_timeout: Duration,
    /// Re-deliveries before an event is dead-lettered
    pub max_retries: u32,
    /// Fixed delay before each re-delivery
    pub retry_delay: Duration,
    pub num_workers: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            poll_interval: Duration::from_millis(defaults::POLL_INTERVAL_MS),
            pop_timeout: Duration::from_millis(defaults::POP_TIMEOUT_MS),
            max_retries: defaults::MAX_RETRIES,
            retry_delay: Duration::from_millis(defaults::RETRY_DELAY_MS),
            num_workers: defaults::NUM_WORKERS,
        }
    }
}

impl WorkerConfig {
    /// Re-delivery schedule: `max_retries + 1` deliveries, `retry_delay` apart
    pub fn retry_policy(&self) -> FixedDelay {
        FixedDelay::new(self.retry_delay, self.max_retries.saturating_add(1))
    }
}

/// State shared by every loop of a pool
#[derive(Debug)]
struct PoolShared {
    queue: Arc<EventQueue>,
    registry: Arc<PatternRegistry>,
    config: WorkerConfig,
    retry_policy: FixedDelay,
    /// Control flag for the worker loops
    running: AtomicBool,
    /// Wakes sleeping loops on stop
    shutdown_notify: Notify,
    stats: WorkerStats,
}

/// Concurrent consumers of one queue
#[derive(Debug)]
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(queue: Arc<EventQueue>, registry: Arc<PatternRegistry>, config: WorkerConfig) -> Self {
        let retry_policy = config.retry_policy();
        Self {
            shared: Arc::new(PoolShared {
                queue,
                registry,
                config,
                retry_policy,
                running: AtomicBool::new(false),
                shutdown_notify: Notify::new(),
                stats: WorkerStats::default(),
            }),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.shared.config
    }

    /// Spawn the worker loops. No-op while running.
    pub fn start(&self) {
        if self.shared.running.swap(true, Ordering::AcqRel) {
            debug!(queue = %self.shared.queue.name(), "Worker pool already running");
            return;
        }

        let mut handles = self.handles.lock();
        for worker_id in 0..self.shared.config.num_workers.max(1) {
            let shared = Arc::clone(&self.shared);
            handles.push(tokio::spawn(worker_loop(shared, worker_id)));
        }

        info!(
            queue = %self.shared.queue.name(),
            num_workers = handles.len(),
            batch_size = self.shared.config.batch_size,
            "Worker pool started"
        );
    }

    /// Signal every loop to stop and wait for them to finish their current
    /// iteration. No-op when not running.
    pub async fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.shutdown_notify.notify_waiters();

        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
        if handles.is_empty() {
            return;
        }

        for result in join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "Worker task ended abnormally");
            }
        }
        info!(queue = %self.shared.queue.name(), "Worker pool stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // let detached loops wind down on their own
        self.shared.running.store(false, Ordering::Release);
        self.shared.shutdown_notify.notify_waiters();
    }
}

async fn worker_loop(shared: Arc<PoolShared>, worker_id: usize) {
    info!(worker_id = worker_id, queue = %shared.queue.name(), "Starting worker loop");

    loop {
        // Registered before the flag check so a stop during the pop is not missed
        let shutdown = shared.shutdown_notify.notified();
        tokio::pin!(shutdown);
        shutdown.as_mut().enable();

        if !shared.running.load(Ordering::Acquire) {
            break;
        }

        let idle = match shared
            .queue
            .pop_batch(shared.config.batch_size, shared.config.pop_timeout)
            .await
        {
            Ok(events) if events.is_empty() => true,
            Ok(events) => {
                debug!(worker_id = worker_id, count = events.len(), "Dispatching batch");
                join_all(events.into_iter().map(|event| dispatch(&shared, event))).await;
                false
            }
            Err(e) => {
                shared.stats.record_loop_error();
                error!(worker_id = worker_id, error = %e, "Failed to pop batch");
                true
            }
        };

        if idle {
            // Wait with ability to be interrupted by shutdown
            tokio::select! {
                _ = tokio::time::sleep(shared.config.poll_interval) => {},
                _ = &mut shutdown => {
                    debug!(worker_id = worker_id, "Shutdown notification received");
                    break;
                }
            }
        }
    }

    info!(worker_id = worker_id, queue = %shared.queue.name(), "Worker loop ended");
}

/// Run one handler, turning a panic into an ordinary handler failure so it
/// takes the retry and dead-letter path instead of unwinding the loop
async fn invoke(handler: &HandlerRef, event: &Event) -> HandlerResult {
    match AssertUnwindSafe(handler.handle(event)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let panic_msg = if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            error!(
                handler = %handler.name(),
                event = %event.name(),
                panic = %panic_msg,
                "Handler panicked"
            );
            Err(HandlerError::new(format!("handler panicked: {panic_msg}"))
                .with_handler(handler.name()))
        }
    }
}

async fn dispatch(shared: &PoolShared, mut event: Event) {
    shared.stats.record_processed();

    let handlers = shared.registry.get_handlers(&event);
    if handlers.is_empty() {
        warn!(event = %event.name(), "No handlers registered for event");
        shared.stats.record_unhandled();
        if let Err(e) = shared.queue.ack(&event).await {
            shared.stats.record_dispatch_error();
            error!(event = %event.name(), error = %e, "Failed to ack unhandled event");
        }
        return;
    }

    let results = join_all(handlers.iter().map(|handler| invoke(handler, &event))).await;
    let first_failure: Option<HandlerError> = handlers
        .iter()
        .zip(results)
        .find_map(|(handler, result)| result.err().map(|e| e.with_handler(handler.name())));

    let Some(failure) = first_failure else {
        match shared.queue.ack(&event).await {
            Ok(_) => shared.stats.record_acked(),
            Err(e) => {
                shared.stats.record_dispatch_error();
                error!(event = %event.name(), error = %e, "Failed to ack event");
            }
        }
        return;
    };

    let retries = event.retries();
    // deliveries so far = retries + 1
    if shared.retry_policy.should_retry(retries.saturating_add(1)) {
        let mut next = event.clone();
        next.set_retries(retries + 1);
        let delay = shared.retry_policy.delay_for_attempt(retries + 1);

        warn!(
            event = %event.name(),
            handler = failure.handler.as_deref().unwrap_or_default(),
            error = %failure,
            retry = retries + 1,
            max_retries = shared.config.max_retries,
            "Handler failed, scheduling retry"
        );
        match shared.queue.retry(&next, delay).await {
            Ok(()) => shared.stats.record_retried(),
            Err(e) => {
                shared.stats.record_dispatch_error();
                error!(event = %event.name(), error = %e, "Failed to schedule retry");
            }
        }
    } else {
        error!(
            event = %event.name(),
            handler = failure.handler.as_deref().unwrap_or_default(),
            error = %failure,
            retries = retries,
            "Retries exhausted, dead-lettering event"
        );
        match shared.queue.nack(&mut event, failure.message).await {
            Ok(()) => shared.stats.record_dead_lettered(),
            Err(e) => {
                shared.stats.record_dispatch_error();
                error!(event = %event.name(), error = %e, "Failed to dead-letter event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::connection::{ConnectionConfig, ConnectionManager};
    use crate::messaging::in_memory::InMemoryConnector;
    use crate::messaging::SystemClock;
    use crate::registry::handler::handler_fn;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    async fn setup() -> (Arc<EventQueue>, Arc<PatternRegistry>) {
        let manager = Arc::new(ConnectionManager::new(
            Arc::new(InMemoryConnector::default()),
            ConnectionConfig::default(),
        ));
        let queue = Arc::new(EventQueue::new("jobs", manager, Arc::new(SystemClock)));
        queue.connect().await.unwrap();
        (queue, Arc::new(PatternRegistry::new()))
    }

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            batch_size: 5,
            poll_interval: Duration::from_millis(10),
            pop_timeout: Duration::from_millis(10),
            max_retries: 2,
            retry_delay: Duration::ZERO,
            num_workers: 1,
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[test]
    fn test_retry_policy_allows_max_retries_redeliveries() {
        let policy = fast_config().retry_policy();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let (queue, registry) = setup().await;
        let pool = WorkerPool::new(queue, registry, fast_config());

        pool.stop().await;
        pool.start();
        pool.start();
        assert!(pool.is_running());
        assert_eq!(pool.handles.lock().len(), 1);

        pool.stop().await;
        pool.stop().await;
        assert!(!pool.is_running());
    }

    #[tokio::test]
    async fn test_unhandled_event_is_acked() {
        let (queue, registry) = setup().await;
        queue
            .push(&Event::new("nobody.listens", json!({})), None)
            .await
            .unwrap();

        let pool = WorkerPool::new(queue.clone(), registry, fast_config());
        pool.start();
        wait_until(|| pool.stats().unhandled == 1).await;
        pool.stop().await;

        assert_eq!(queue.stats().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_event_is_dead_lettered_with_first_failure() {
        let (queue, registry) = setup().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        registry.register(
            "order.*",
            handler_fn("first", move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(HandlerError::new("first broke"))
                }
            }),
        );
        registry.register(
            "order.placed",
            handler_fn("second", |_| async { Err(HandlerError::new("second broke")) }),
        );

        queue
            .push(&Event::new("order.placed", json!({"id": 7})), None)
            .await
            .unwrap();

        let pool = WorkerPool::new(queue.clone(), registry, fast_config());
        pool.start();
        wait_until(|| pool.stats().dead_lettered == 1).await;
        pool.stop().await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let failed = queue.failed_events().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error(), Some("first broke"));
        assert_eq!(failed[0].retries(), 2);
        assert!(failed[0].failed_at().is_some());
        assert_eq!(pool.stats().retried, 2);
    }
}
