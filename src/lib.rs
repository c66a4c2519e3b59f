#![allow(clippy::doc_markdown)] // Allow technical terms like Redis, BLMOVE in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Relay Core
//!
//! Reliable, asynchronous event delivery: producers publish named events,
//! independent workers consume them, dispatch to registered handlers and
//! guarantee at-least-once processing with bounded retries and a dead-letter
//! path.
//!
//! ## Architecture
//!
//! ```text
//! producer ──► EventBus::publish ──► EventQueue (durable) ──► WorkerPool
//!                                                                 │
//!                      PatternRegistry ◄── resolve handlers ──────┤
//!                                                                 ▼
//!                            ack │ retry (fixed delay) │ nack ──► dead-letter
//! ```
//!
//! ## Module Organization
//!
//! - [`events`] - Event entity and glob patterns
//! - [`messaging`] - Broker abstraction, connection manager and durable queue
//! - [`registry`] - Handler capability and pattern registry
//! - [`bus`] - Producer-facing facade
//! - [`worker`] - Concurrent consumers
//! - [`resilience`] - Retry and backoff policies
//! - [`backend`] - Non-durable pub/sub transport
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Tracing setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use relay_core::bus::EventBus;
//! use relay_core::events::Event;
//! use relay_core::messaging::{ConnectionConfig, ConnectionManager, EventQueue, InMemoryConnector};
//! use relay_core::registry::handler_fn;
//! use relay_core::worker::WorkerConfig;
//!
//! # async fn example() -> relay_core::error::Result<()> {
//! let connection = Arc::new(ConnectionManager::new(
//!     Arc::new(InMemoryConnector::default()),
//!     ConnectionConfig::default(),
//! ));
//! let bus = EventBus::with_queue(Arc::new(EventQueue::with_system_clock("events", connection)));
//! bus.connect().await?;
//!
//! bus.subscribe("order.*", handler_fn("fulfil", |event| async move {
//!     tracing::info!(order = ?event.data().get("id"), "fulfilling");
//!     Ok(())
//! }));
//!
//! let pool = bus.worker_pool(WorkerConfig::default());
//! pool.start();
//! bus.publish(&Event::new("order.placed", serde_json::json!({"id": 42})), None).await?;
//! pool.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod bus;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod messaging;
pub mod registry;
pub mod resilience;
pub mod test_utils;
pub mod utils;
pub mod worker;

pub use bus::EventBus;
pub use config::{ConfigManager, RelayConfig};
pub use error::{EventBusError, Result};
pub use events::{Event, GlobPattern, MatchMode, Payload};
pub use messaging::{
    Broker, BrokerConnector, Clock, ConnectionConfig, ConnectionManager, EventQueue, QueueStats,
};
pub use registry::{handler_fn, EventHandler, HandlerError, HandlerRef, PatternRegistry};
pub use worker::{WorkerConfig, WorkerPool, WorkerStatsSnapshot};
