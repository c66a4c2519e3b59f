//! # In-Memory Broker
//!
//! Process-local [`Broker`] for tests and single-process deployments. Every
//! primitive runs under one mutex, so each call is atomic with respect to all
//! others. Blocking claims park on a [`Notify`] that is signalled whenever a
//! list grows.
//!
//! The broker can be switched unavailable to simulate an unreachable server:
//! every command then fails with [`BrokerError::Unavailable`] and
//! [`InMemoryConnector`] refuses new connections.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use crate::messaging::broker::{Broker, BrokerConnector, BrokerError, BrokerResult, Placement};

#[derive(Debug, Default)]
struct Store {
    lists: HashMap<String, VecDeque<String>>,
    /// Sorted sets as `(score, member)` ordered by score, then member
    zsets: HashMap<String, Vec<(f64, String)>>,
}

impl Store {
    fn claim(&mut self, source: &str, destination: &str) -> Option<String> {
        let payload = self.lists.get_mut(source)?.pop_front()?;
        self.lists
            .entry(destination.to_string())
            .or_default()
            .push_back(payload.clone());
        self.drop_empty(source);
        Some(payload)
    }

    fn remove(&mut self, list: &str, payload: &str) -> bool {
        let Some(items) = self.lists.get_mut(list) else {
            return false;
        };
        let removed = match items.iter().position(|item| item == payload) {
            Some(index) => items.remove(index).is_some(),
            None => false,
        };
        self.drop_empty(list);
        removed
    }

    fn zadd(&mut self, zset: &str, score: f64, member: &str) {
        let entries = self.zsets.entry(zset.to_string()).or_default();
        entries.retain(|(_, m)| m != member);
        let index = entries.partition_point(|(s, m)| {
            s.total_cmp(&score).then_with(|| m.as_str().cmp(member)) == std::cmp::Ordering::Less
        });
        entries.insert(index, (score, member.to_string()));
    }

    fn push_back(&mut self, list: &str, payload: &str) {
        self.lists
            .entry(list.to_string())
            .or_default()
            .push_back(payload.to_string());
    }

    // Redis deletes a key once its collection is empty
    fn drop_empty(&mut self, list: &str) {
        if self.lists.get(list).is_some_and(VecDeque::is_empty) {
            self.lists.remove(list);
        }
    }
}

/// Broker backed by process memory
#[derive(Debug)]
pub struct InMemoryBroker {
    store: Mutex<Store>,
    pushed: Notify,
    available: AtomicBool,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store::default()),
            pushed: Notify::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the server going away or coming back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        debug!(available = available, "In-memory broker availability changed");
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> BrokerResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(BrokerError::unavailable("in-memory broker is offline"))
        }
    }

    fn signal_push(&self) {
        self.pushed.notify_waiters();
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn ping(&self) -> BrokerResult<()> {
        self.check_available()
    }

    async fn push_back(&self, list: &str, payload: &str) -> BrokerResult<()> {
        self.check_available()?;
        self.store.lock().push_back(list, payload);
        self.signal_push();
        Ok(())
    }

    async fn schedule(&self, zset: &str, score: f64, payload: &str) -> BrokerResult<()> {
        self.check_available()?;
        self.store.lock().zadd(zset, score, payload);
        Ok(())
    }

    async fn promote_due(
        &self,
        zset: &str,
        list: &str,
        max_score: f64,
        limit: usize,
    ) -> BrokerResult<usize> {
        self.check_available()?;
        let moved = {
            let mut store = self.store.lock();
            let due: Vec<String> = match store.zsets.get_mut(zset) {
                Some(entries) => {
                    let count = entries
                        .iter()
                        .take(limit)
                        .take_while(|(score, _)| *score <= max_score)
                        .count();
                    entries.drain(..count).map(|(_, member)| member).collect()
                }
                None => Vec::new(),
            };
            if store.zsets.get(zset).is_some_and(Vec::is_empty) {
                store.zsets.remove(zset);
            }
            for payload in &due {
                store.push_back(list, payload);
            }
            due.len()
        };
        if moved > 0 {
            self.signal_push();
        }
        Ok(moved)
    }

    async fn claim(&self, source: &str, destination: &str) -> BrokerResult<Option<String>> {
        self.check_available()?;
        Ok(self.store.lock().claim(source, destination))
    }

    async fn claim_blocking(
        &self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> BrokerResult<Option<String>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register interest before checking so a push between the check
            // and the wait is not missed
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            self.check_available()?;
            if let Some(payload) = self.store.lock().claim(source, destination) {
                return Ok(Some(payload));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn remove(&self, list: &str, payload: &str) -> BrokerResult<bool> {
        self.check_available()?;
        Ok(self.store.lock().remove(list, payload))
    }

    async fn transfer(
        &self,
        from: &str,
        raw: &str,
        to: Placement<'_>,
        payload: &str,
    ) -> BrokerResult<bool> {
        self.check_available()?;
        let removed = {
            let mut store = self.store.lock();
            let removed = store.remove(from, raw);
            match to {
                Placement::Tail(list) => store.push_back(list, payload),
                Placement::Scheduled { key, score } => store.zadd(key, score, payload),
            }
            removed
        };
        if matches!(to, Placement::Tail(_)) {
            self.signal_push();
        }
        Ok(removed)
    }

    async fn move_all(&self, source: &str, destination: &str) -> BrokerResult<usize> {
        let mut moved = 0;
        loop {
            self.check_available()?;
            if self.store.lock().claim(source, destination).is_none() {
                break;
            }
            moved += 1;
        }
        if moved > 0 {
            self.signal_push();
        }
        Ok(moved)
    }

    async fn list_range(&self, list: &str) -> BrokerResult<Vec<String>> {
        self.check_available()?;
        Ok(self
            .store
            .lock()
            .lists
            .get(list)
            .map(|items| items.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_len(&self, list: &str) -> BrokerResult<usize> {
        self.check_available()?;
        Ok(self.store.lock().lists.get(list).map_or(0, VecDeque::len))
    }

    async fn zset_len(&self, zset: &str) -> BrokerResult<usize> {
        self.check_available()?;
        Ok(self.store.lock().zsets.get(zset).map_or(0, Vec::len))
    }

    async fn zset_range(&self, zset: &str) -> BrokerResult<Vec<(String, f64)>> {
        self.check_available()?;
        Ok(self
            .store
            .lock()
            .zsets
            .get(zset)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(score, member)| (member.clone(), *score))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete(&self, keys: &[&str]) -> BrokerResult<()> {
        self.check_available()?;
        let mut store = self.store.lock();
        for key in keys {
            store.lists.remove(*key);
            store.zsets.remove(*key);
        }
        Ok(())
    }
}

/// Connector handing out a shared [`InMemoryBroker`]
#[derive(Debug, Clone)]
pub struct InMemoryConnector {
    broker: Arc<InMemoryBroker>,
    attempts: Arc<AtomicUsize>,
}

impl Default for InMemoryConnector {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryBroker::new()))
    }
}

impl InMemoryConnector {
    pub fn new(broker: Arc<InMemoryBroker>) -> Self {
        Self {
            broker,
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn broker(&self) -> Arc<InMemoryBroker> {
        Arc::clone(&self.broker)
    }

    /// Number of connect attempts made so far
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerConnector for InMemoryConnector {
    async fn connect(&self) -> BrokerResult<Arc<dyn Broker>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.broker.check_available()?;
        let broker: Arc<dyn Broker> = self.broker.clone();
        Ok(broker)
    }

    fn describe(&self) -> String {
        "memory://local".to_string()
    }
}
