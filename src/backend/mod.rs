//! # Backends
//!
//! Alternative transports that are not used by the worker pool.

pub mod pubsub;

pub use pubsub::{PubSubBackend, PubSubHub};
