//! # Resilience Module
//!
//! Retry policies for event delivery.
//!
//! ## Architecture
//!
//! - **Re-delivery** (worker pool): a failed event goes back through the queue
//!   after a fixed `retry_delay`, at most `max_retries` times
//! - **In-process retries** ([`RetryingHandler`]): a handler is re-invoked
//!   with exponential backoff and jitter before the failure reaches the pool
//! - **Reconnects** (connection manager): doubling delay between attempts
//!
//! ## Usage
//!
//! ```rust
//! use relay_core::registry::{handler_fn, PatternRegistry};
//! use relay_core::resilience::{ExponentialBackoff, RetryingHandler};
//! use std::time::Duration;
//!
//! let registry = PatternRegistry::new();
//! let mailer = handler_fn("mailer", |_| async { Ok(()) });
//!
//! let policy = ExponentialBackoff {
//!     base_delay: Duration::from_millis(200),
//!     ..ExponentialBackoff::default()
//! };
//! registry.register("user.created", RetryingHandler::wrap(mailer, policy));
//! ```

pub mod backoff;
pub mod retrying_handler;

pub use backoff::{ExponentialBackoff, FixedDelay, RetryPolicy};
pub use retrying_handler::RetryingHandler;
