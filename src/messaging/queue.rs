//! # Durable Event Queue
//!
//! At-least-once queue over four broker regions derived from one base name
//! `Q`:
//!
//! | Region | Key | Shape |
//! |---|---|---|
//! | ready | `Q` | FIFO list |
//! | scheduled | `Q:scheduled` | sorted set scored by due time (epoch seconds) |
//! | processing | `Q:processing` | list of claimed, unacknowledged payloads |
//! | dead-letter | `Q:failed` | list |
//!
//! Every transition between regions is one atomic broker step, so a payload
//! is a member of at most one region at any instant:
//!
//! ```text
//! push ──► scheduled ──(due)──► ready ──(claim)──► processing ──(ack)──► ∅
//!   └─────────────────────────────┘                  │ ├──(retry)──► scheduled | ready
//!                                                    │ └──(nack / malformed)──► dead-letter
//!                         ready ◄──(requeue_failed)── dead-letter
//! ```
//!
//! Items left in processing by a crashed consumer stay there; nothing in this
//! type moves them back automatically.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::constants::region_names;
use crate::error::{EventBusError, Result};
use crate::events::Event;
use crate::messaging::broker::{Broker, Placement};
use crate::messaging::clock::{to_score, Clock, SystemClock};
use crate::messaging::connection::ConnectionManager;

/// Region sizes at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub ready: usize,
    pub scheduled: usize,
    pub processing: usize,
    pub failed: usize,
}

impl QueueStats {
    /// Items not yet acknowledged, across all regions
    pub fn total(&self) -> usize {
        self.ready + self.scheduled + self.processing + self.failed
    }
}

/// Durable queue bound to one base name
#[derive(Debug)]
pub struct EventQueue {
    name: String,
    processing_key: String,
    failed_key: String,
    scheduled_key: String,
    connection: Arc<ConnectionManager>,
    clock: Arc<dyn Clock>,
}

impl EventQueue {
    pub fn new(
        name: impl Into<String>,
        connection: Arc<ConnectionManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let name = name.into();
        let (_, processing_key, failed_key, scheduled_key) = region_names(&name);
        Self {
            name,
            processing_key,
            failed_key,
            scheduled_key,
            connection,
            clock,
        }
    }

    /// Queue driven by wall-clock time
    pub fn with_system_clock(name: impl Into<String>, connection: Arc<ConnectionManager>) -> Self {
        Self::new(name, connection, Arc::new(SystemClock))
    }

    /// Base name, also the key of the ready list
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn processing_key(&self) -> &str {
        &self.processing_key
    }

    pub fn failed_key(&self) -> &str {
        &self.failed_key
    }

    pub fn scheduled_key(&self) -> &str {
        &self.scheduled_key
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub async fn connect(&self) -> Result<()> {
        self.connection.connect().await
    }

    pub async fn disconnect(&self) {
        self.connection.disconnect().await
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    fn client(&self) -> Result<Arc<dyn Broker>> {
        self.connection.client()
    }

    /// Enqueue an event. No delay (or zero) appends to the ready list; a
    /// positive delay schedules it for `now + delay`.
    pub async fn push(&self, event: &Event, delay: Option<Duration>) -> Result<()> {
        if event.name().is_empty() {
            return Err(EventBusError::validation("event name must not be empty"));
        }
        let client = self.client()?;
        let payload = event.to_payload()?;

        match delay.filter(|d| !d.is_zero()) {
            None => {
                client.push_back(&self.name, &payload).await?;
                debug!(queue = %self.name, event = %event.name(), "Pushed event");
            }
            Some(delay) => {
                let due = self.due_score(delay);
                client.schedule(&self.scheduled_key, due, &payload).await?;
                debug!(
                    queue = %self.name,
                    event = %event.name(),
                    delay_ms = delay.as_millis() as u64,
                    "Scheduled event"
                );
            }
        }
        Ok(())
    }

    /// Claim up to `batch_size` events.
    ///
    /// Due scheduled items are promoted first. The first claim waits up to
    /// `timeout` for an item; the rest do not wait. A payload that does not
    /// decode is moved to the dead-letter list and left out of the result.
    pub async fn pop_batch(&self, batch_size: usize, timeout: Duration) -> Result<Vec<Event>> {
        let client = self.client()?;
        if batch_size == 0 {
            return Ok(Vec::new());
        }

        let promoted = client
            .promote_due(
                &self.scheduled_key,
                &self.name,
                self.clock.now_score(),
                batch_size,
            )
            .await?;
        if promoted > 0 {
            debug!(queue = %self.name, promoted = promoted, "Promoted due events");
        }

        let Some(first) = client
            .claim_blocking(&self.name, &self.processing_key, timeout)
            .await?
        else {
            return Ok(Vec::new());
        };

        let mut claimed = vec![first];
        while claimed.len() < batch_size {
            match client.claim(&self.name, &self.processing_key).await {
                Ok(Some(raw)) => claimed.push(raw),
                Ok(None) => break,
                Err(e) => {
                    // keep what is already claimed; the items are in processing
                    warn!(queue = %self.name, error = %e, "Claim failed mid-batch");
                    break;
                }
            }
        }

        let mut events = Vec::with_capacity(claimed.len());
        for raw in claimed {
            match Event::from_payload(&raw) {
                Ok(mut event) => {
                    event.set_receipt(raw);
                    events.push(event);
                }
                Err(e) => self.dead_letter_malformed(client.as_ref(), &raw, &e).await,
            }
        }

        debug!(queue = %self.name, count = events.len(), "Popped batch");
        Ok(events)
    }

    async fn dead_letter_malformed(&self, client: &dyn Broker, raw: &str, cause: &EventBusError) {
        error!(queue = %self.name, error = %cause, "Malformed payload moved to dead-letter");
        if let Err(e) = client
            .transfer(&self.processing_key, raw, Placement::Tail(&self.failed_key), raw)
            .await
        {
            error!(
                queue = %self.name,
                error = %e,
                "Failed to dead-letter malformed payload; left in processing"
            );
        }
    }

    /// Remove one instance of the event from processing. Returns whether one
    /// was there.
    pub async fn ack(&self, event: &Event) -> Result<bool> {
        let client = self.client()?;
        let raw = receipt_of(event)?;
        let removed = client.remove(&self.processing_key, &raw).await?;

        if removed {
            debug!(queue = %self.name, event = %event.name(), "Acknowledged event");
        } else {
            debug!(queue = %self.name, event = %event.name(), "Ack found nothing in processing");
        }
        Ok(removed)
    }

    /// Record the failure on the event and move it from processing to the
    /// dead-letter list in one step.
    pub async fn nack(&self, event: &mut Event, error: impl Into<String>) -> Result<()> {
        let client = self.client()?;
        let raw = receipt_of(event)?;
        event.mark_failed(error, self.clock.now());
        let payload = event.detached().to_payload()?;

        let removed = client
            .transfer(
                &self.processing_key,
                &raw,
                Placement::Tail(&self.failed_key),
                &payload,
            )
            .await?;

        warn!(
            queue = %self.name,
            event = %event.name(),
            error = event.error().unwrap_or_default(),
            was_processing = removed,
            "Event moved to dead-letter"
        );
        Ok(())
    }

    /// Re-enqueue a claimed event as given, removing the claimed instance from
    /// processing in the same step. A zero delay goes straight to ready.
    pub async fn retry(&self, event: &Event, delay: Duration) -> Result<()> {
        let client = self.client()?;
        let raw = receipt_of(event)?;
        let payload = event.detached().to_payload()?;

        let placement = if delay.is_zero() {
            Placement::Tail(&self.name)
        } else {
            Placement::Scheduled {
                key: &self.scheduled_key,
                score: self.due_score(delay),
            }
        };
        client
            .transfer(&self.processing_key, &raw, placement, &payload)
            .await?;

        debug!(
            queue = %self.name,
            event = %event.name(),
            retries = event.retries(),
            delay_ms = delay.as_millis() as u64,
            "Event scheduled for retry"
        );
        Ok(())
    }

    /// Move every dead-lettered item back to ready, unchanged. Returns how many
    /// moved.
    pub async fn requeue_failed(&self) -> Result<usize> {
        let client = self.client()?;
        let moved = client.move_all(&self.failed_key, &self.name).await?;
        info!(queue = %self.name, count = moved, "Requeued dead-lettered events");
        Ok(moved)
    }

    /// Decoded contents of the dead-letter list, oldest first
    pub async fn failed_events(&self) -> Result<Vec<Event>> {
        self.decode_list(&self.failed_key).await
    }

    /// Decoded contents of the processing list
    pub async fn processing_events(&self) -> Result<Vec<Event>> {
        self.decode_list(&self.processing_key).await
    }

    pub async fn scheduled_len(&self) -> Result<usize> {
        Ok(self.client()?.zset_len(&self.scheduled_key).await?)
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let client = self.client()?;
        Ok(QueueStats {
            ready: client.list_len(&self.name).await?,
            scheduled: client.zset_len(&self.scheduled_key).await?,
            processing: client.list_len(&self.processing_key).await?,
            failed: client.list_len(&self.failed_key).await?,
        })
    }

    /// Delete all four regions
    pub async fn purge(&self) -> Result<()> {
        let client = self.client()?;
        client
            .delete(&[
                self.name.as_str(),
                self.processing_key.as_str(),
                self.failed_key.as_str(),
                self.scheduled_key.as_str(),
            ])
            .await?;
        info!(queue = %self.name, "Purged queue");
        Ok(())
    }

    async fn decode_list(&self, key: &str) -> Result<Vec<Event>> {
        let raw_items = self.client()?.list_range(key).await?;
        let mut events = Vec::with_capacity(raw_items.len());
        for raw in raw_items {
            match Event::from_payload(&raw) {
                Ok(event) => events.push(event),
                Err(e) => warn!(queue = %self.name, key = key, error = %e, "Skipping undecodable item"),
            }
        }
        Ok(events)
    }

    fn due_score(&self, delay: Duration) -> f64 {
        let now = self.clock.now();
        match chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
        {
            Some(due) => to_score(due),
            None => f64::MAX,
        }
    }
}

/// Raw payload identifying the claimed instance of `event`
fn receipt_of(event: &Event) -> Result<String> {
    match event.receipt() {
        Some(raw) => Ok(raw.to_string()),
        None => event.to_payload(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::clock::ManualClock;
    use crate::messaging::connection::ConnectionConfig;
    use crate::messaging::in_memory::InMemoryConnector;
    use serde_json::json;

    async fn queue() -> (EventQueue, Arc<ManualClock>, InMemoryConnector) {
        let connector = InMemoryConnector::default();
        let manager = Arc::new(ConnectionManager::new(
            Arc::new(connector.clone()),
            ConnectionConfig::default(),
        ));
        let clock = Arc::new(ManualClock::new());
        let queue = EventQueue::new("events", manager, clock.clone());
        queue.connect().await.unwrap();
        (queue, clock, connector)
    }

    #[tokio::test]
    async fn test_push_rejects_empty_name() {
        let (queue, _, _) = queue().await;
        let err = queue
            .push(&Event::new("", json!({})), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EventBusError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_push_while_disconnected_is_connection_error() {
        let (queue, _, _) = queue().await;
        queue.disconnect().await;

        let err = queue
            .push(&Event::new("user.created", json!({})), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EventBusError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_ack_by_receipt_survives_key_reordering() {
        let (queue, _, connector) = queue().await;
        // hand-written record whose key order differs from ours
        let raw = r#"{"data":{"id":1},"name":"user.created","metadata":{},"error":null,"created_at":null,"failed_at":null}"#;
        connector.broker().push_back("events", raw).await.unwrap();

        let events = queue.pop_batch(10, Duration::ZERO).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].receipt(), Some(raw));

        assert!(queue.ack(&events[0]).await.unwrap());
        assert_eq!(queue.stats().await.unwrap(), QueueStats::default());
    }

    #[tokio::test]
    async fn test_malformed_payload_goes_to_dead_letter() {
        let (queue, _, connector) = queue().await;
        connector.broker().push_back("events", "{not json").await.unwrap();
        queue
            .push(&Event::new("user.created", json!({})), None)
            .await
            .unwrap();

        let events = queue.pop_batch(10, Duration::ZERO).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), "user.created");

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.processing, 1);
        assert_eq!(
            connector.broker().list_range("events:failed").await.unwrap(),
            vec!["{not json"]
        );
    }

    #[tokio::test]
    async fn test_retry_with_zero_delay_returns_to_ready() {
        let (queue, _, _) = queue().await;
        queue
            .push(&Event::new("order.placed", json!({})), None)
            .await
            .unwrap();

        let mut events = queue.pop_batch(1, Duration::ZERO).await.unwrap();
        let mut event = events.remove(0);
        event.set_retries(1);
        queue.retry(&event, Duration::ZERO).await.unwrap();

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.ready, 1);
        assert_eq!(stats.processing, 0);

        let again = queue.pop_batch(1, Duration::ZERO).await.unwrap();
        assert_eq!(again[0].retries(), 1);
    }

    #[tokio::test]
    async fn test_retry_with_delay_waits_for_clock() {
        let (queue, clock, _) = queue().await;
        queue
            .push(&Event::new("order.placed", json!({})), None)
            .await
            .unwrap();
        let events = queue.pop_batch(1, Duration::ZERO).await.unwrap();
        queue.retry(&events[0], Duration::from_secs(10)).await.unwrap();

        assert_eq!(queue.scheduled_len().await.unwrap(), 1);
        assert!(queue.pop_batch(1, Duration::ZERO).await.unwrap().is_empty());

        clock.advance(Duration::from_secs(10));
        assert_eq!(queue.pop_batch(1, Duration::ZERO).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_purge_clears_every_region() {
        let (queue, _, _) = queue().await;
        queue
            .push(&Event::new("a.b", json!({})), None)
            .await
            .unwrap();
        queue
            .push(&Event::new("a.c", json!({})), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        queue.pop_batch(1, Duration::ZERO).await.unwrap();

        queue.purge().await.unwrap();
        assert_eq!(queue.stats().await.unwrap().total(), 0);
    }
}
