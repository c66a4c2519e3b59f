//! # Messaging Module
//!
//! Durable queueing on top of a pluggable broker.
//!
//! ```text
//! EventQueue ──► ConnectionManager ──► BrokerConnector ──► Arc<dyn Broker>
//!     │                                                      ├── InMemoryBroker
//!     └── Clock (due times, failed_at)                       └── RedisBroker (feature "redis")
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use relay_core::events::Event;
//! use relay_core::messaging::{ConnectionConfig, ConnectionManager, EventQueue, InMemoryConnector};
//!
//! # tokio_test::block_on(async {
//! let connection = Arc::new(ConnectionManager::new(
//!     Arc::new(InMemoryConnector::default()),
//!     ConnectionConfig::default(),
//! ));
//! let queue = EventQueue::with_system_clock("emails", connection);
//! queue.connect().await?;
//!
//! queue.push(&Event::new("email.send", serde_json::json!({"to": "a@b.c"})), None).await?;
//! let batch = queue.pop_batch(10, Duration::from_millis(50)).await?;
//! assert_eq!(batch.len(), 1);
//! assert!(queue.ack(&batch[0]).await?);
//! # Ok::<(), relay_core::error::EventBusError>(())
//! # }).unwrap();
//! ```

pub mod broker;
pub mod clock;
pub mod connection;
pub mod in_memory;
pub mod queue;
#[cfg(feature = "redis")]
pub mod redis;

pub use broker::{Broker, BrokerConnector, BrokerError, BrokerResult, Placement};
pub use clock::{Clock, ManualClock, SystemClock};
pub use connection::{ConnectionConfig, ConnectionManager};
pub use in_memory::{InMemoryBroker, InMemoryConnector};
pub use queue::{EventQueue, QueueStats};
#[cfg(feature = "redis")]
pub use self::redis::{RedisBroker, RedisConnector};
