//! # Broker Abstraction
//!
//! The primitives the durable queue is built from. Every method is a single
//! broker-side atomic operation: the queue never emulates a move with a
//! separate read and write, so two consumers can never claim the same item.
//!
//! Lists behave like Redis lists (head = left, tail = right) and sorted sets
//! like Redis sorted sets (unique members ordered by score).
//!
//! Implementations:
//! - [`InMemoryBroker`](crate::messaging::in_memory::InMemoryBroker): one
//!   process, every primitive runs under a single mutex
//! - `RedisBroker` (feature `redis`): `LMOVE`/`BLMOVE`, a Lua script and
//!   `MULTI`/`EXEC` pipelines

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Failures reported by a broker
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrokerError {
    #[error("Broker unavailable: {message}")]
    Unavailable { message: String },

    #[error("Broker command {operation} failed: {message}")]
    Command { operation: String, message: String },
}

impl BrokerError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn command(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Command {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;

/// Where [`Broker::transfer`] puts the new payload
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement<'a> {
    /// Append to the tail of a list
    Tail(&'a str),
    /// Insert into a sorted set with the given score
    Scheduled { key: &'a str, score: f64 },
}

/// Atomic storage primitives backing an [`EventQueue`](crate::messaging::queue::EventQueue)
#[async_trait]
pub trait Broker: Send + Sync + Debug + 'static {
    /// Round trip used by health checks
    async fn ping(&self) -> BrokerResult<()>;

    /// `RPUSH list payload`
    async fn push_back(&self, list: &str, payload: &str) -> BrokerResult<()>;

    /// `ZADD zset score payload`
    async fn schedule(&self, zset: &str, score: f64, payload: &str) -> BrokerResult<()>;

    /// Move up to `limit` members with `score <= max_score`, lowest first, from
    /// `zset` to the tail of `list`. Returns how many moved.
    async fn promote_due(
        &self,
        zset: &str,
        list: &str,
        max_score: f64,
        limit: usize,
    ) -> BrokerResult<usize>;

    /// `LMOVE source destination LEFT RIGHT`
    async fn claim(&self, source: &str, destination: &str) -> BrokerResult<Option<String>>;

    /// `BLMOVE source destination LEFT RIGHT timeout`
    async fn claim_blocking(
        &self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> BrokerResult<Option<String>>;

    /// `LREM list 1 payload`; whether an instance was removed
    async fn remove(&self, list: &str, payload: &str) -> BrokerResult<bool>;

    /// Remove one instance of `raw` from `from` and place `payload` at `to`,
    /// as one indivisible step. The placement happens even when `raw` was not
    /// found; the return value says whether it was.
    async fn transfer(
        &self,
        from: &str,
        raw: &str,
        to: Placement<'_>,
        payload: &str,
    ) -> BrokerResult<bool>;

    /// Move every item of `source` to the tail of `destination`, one atomic
    /// move at a time. Returns how many moved.
    async fn move_all(&self, source: &str, destination: &str) -> BrokerResult<usize>;

    /// `LRANGE list 0 -1`
    async fn list_range(&self, list: &str) -> BrokerResult<Vec<String>>;

    /// `LLEN list`
    async fn list_len(&self, list: &str) -> BrokerResult<usize>;

    /// `ZCARD zset`
    async fn zset_len(&self, zset: &str) -> BrokerResult<usize>;

    /// `ZRANGE zset 0 -1 WITHSCORES`
    async fn zset_range(&self, zset: &str) -> BrokerResult<Vec<(String, f64)>>;

    /// `DEL keys...`
    async fn delete(&self, keys: &[&str]) -> BrokerResult<()>;
}

/// Factory that opens a broker client; used by the connection manager for
/// every (re)connect attempt
#[async_trait]
pub trait BrokerConnector: Send + Sync + Debug + 'static {
    async fn connect(&self) -> BrokerResult<Arc<dyn Broker>>;

    /// Connection target for logs, without credentials
    fn describe(&self) -> String;
}
