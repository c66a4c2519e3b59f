//! Shared setup for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use relay_core::events::Event;
use relay_core::messaging::EventQueue;
use relay_core::test_utils::{in_memory_queue, setup_test_environment, InMemoryFixture};
use relay_core::worker::WorkerConfig;
use serde_json::json;

/// Short blocking window so empty pops do not slow the suite down
pub const POP_TIMEOUT: Duration = Duration::from_millis(20);

pub async fn fixture(name: &str) -> InMemoryFixture {
    setup_test_environment();
    in_memory_queue(name)
        .await
        .expect("in-memory queue should connect")
}

/// Worker settings tuned for tests: tiny idle sleeps, immediate re-delivery
pub fn fast_worker_config(num_workers: usize, max_retries: u32) -> WorkerConfig {
    WorkerConfig {
        batch_size: 10,
        poll_interval: Duration::from_millis(5),
        pop_timeout: POP_TIMEOUT,
        max_retries,
        retry_delay: Duration::ZERO,
        num_workers,
    }
}

/// Push `count` distinct events named `name`, each carrying its index as `seq`
pub async fn preload(queue: &Arc<EventQueue>, name: &str, count: usize) {
    for seq in 0..count {
        queue
            .push(&Event::new(name, json!({ "seq": seq })), None)
            .await
            .expect("push should succeed");
    }
}
