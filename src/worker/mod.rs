//! # Worker Infrastructure
//!
//! Concurrent consumers of a durable queue and their counters.

pub mod pool;
pub mod stats;

pub use pool::{WorkerConfig, WorkerPool};
pub use stats::{WorkerStats, WorkerStatsSnapshot};
