//! # Connection Manager
//!
//! Owns the broker client handle. `connect` retries with a doubling delay and,
//! once connected, starts a single background health check that pings the
//! broker every `health_check_interval`. A failed ping drops the handle and
//! runs the connect procedure again from inside the same task.
//!
//! While disconnected, [`ConnectionManager::client`] fails with
//! [`EventBusError::Connection`], which callers surface unchanged.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::constants::defaults;
use crate::error::{EventBusError, Result};
use crate::messaging::broker::{Broker, BrokerConnector};
use crate::resilience::backoff::{ExponentialBackoff, RetryPolicy};

/// Reconnect and health-check settings
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Connect attempts before giving up
    pub max_retries: u32,
    /// Delay after the first failed attempt; doubles after each further one
    pub retry_delay: Duration,
    pub health_check_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::CONNECTION_MAX_RETRIES,
            retry_delay: Duration::from_millis(defaults::CONNECTION_RETRY_DELAY_MS),
            health_check_interval: Duration::from_millis(defaults::HEALTH_CHECK_INTERVAL_MS),
        }
    }
}

struct ConnectionInner {
    connector: Arc<dyn BrokerConnector>,
    config: ConnectionConfig,
    client: RwLock<Option<Arc<dyn Broker>>>,
    health_task: Mutex<Option<JoinHandle<()>>>,
    /// Serializes connect procedures between callers and the health task
    connect_lock: tokio::sync::Mutex<()>,
}

impl ConnectionInner {
    fn current(&self) -> Option<Arc<dyn Broker>> {
        self.client.read().clone()
    }

    /// Run the retrying connect procedure and install the new client
    async fn establish(&self) -> Result<Arc<dyn Broker>> {
        let _guard = self.connect_lock.lock().await;
        if let Some(client) = self.current() {
            return Ok(client);
        }

        let attempts = self.config.max_retries.max(1);
        let backoff = ExponentialBackoff::doubling(self.config.retry_delay, attempts);
        let target = self.connector.describe();
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.connector.connect().await {
                Ok(client) => {
                    *self.client.write() = Some(Arc::clone(&client));
                    info!(target_url = %target, attempt = attempt, "Connected to broker");
                    return Ok(client);
                }
                Err(e) => {
                    warn!(
                        target_url = %target,
                        attempt = attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Broker connection attempt failed"
                    );
                    last_error = Some(e);
                    if backoff.should_retry(attempt) {
                        tokio::time::sleep(backoff.delay_for_attempt(attempt)).await;
                    }
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt made".to_string());
        error!(target_url = %target, attempts = attempts, "Giving up on broker connection");
        Err(EventBusError::connection(format!(
            "failed to connect to {target} after {attempts} attempts: {reason}"
        )))
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        if let Some(handle) = self.health_task.get_mut().take() {
            handle.abort();
        }
    }
}

/// Shared owner of the broker connection
pub struct ConnectionManager {
    inner: Arc<ConnectionInner>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("target", &self.inner.connector.describe())
            .field("connected", &self.is_connected())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn BrokerConnector>, config: ConnectionConfig) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                connector,
                config,
                client: RwLock::new(None),
                health_task: Mutex::new(None),
                connect_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Connect with retries and start the health check. No-op while connected.
    pub async fn connect(&self) -> Result<()> {
        self.inner.establish().await?;
        self.ensure_health_task();
        Ok(())
    }

    /// Stop the health check and drop the client handle
    pub async fn disconnect(&self) {
        let handle = self.inner.health_task.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            // wait for the abort so the task cannot reinstall a client
            let _ = handle.await;
        }

        if self.inner.client.write().take().is_some() {
            info!(target_url = %self.inner.connector.describe(), "Disconnected from broker");
        }
    }

    /// The live client, or a connection error while disconnected
    pub fn client(&self) -> Result<Arc<dyn Broker>> {
        self.inner
            .current()
            .ok_or_else(|| EventBusError::connection("not connected to broker"))
    }

    pub fn is_connected(&self) -> bool {
        self.inner.client.read().is_some()
    }

    fn ensure_health_task(&self) {
        let mut slot = self.inner.health_task.lock();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let interval = self.inner.config.health_check_interval;
        *slot = Some(tokio::spawn(health_check_loop(weak, interval)));
        debug!(interval_ms = interval.as_millis() as u64, "Started broker health check");
    }
}

async fn health_check_loop(inner: Weak<ConnectionInner>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;

        // Manager dropped, nothing left to watch
        let Some(inner) = inner.upgrade() else {
            break;
        };

        let healthy = match inner.current() {
            Some(client) => match client.ping().await {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Broker health check failed, reconnecting");
                    *inner.client.write() = None;
                    false
                }
            },
            None => false,
        };

        if !healthy {
            if let Err(e) = inner.establish().await {
                error!(error = %e, "Broker reconnect failed, retrying at next health check");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::in_memory::InMemoryConnector;

    fn config(max_retries: u32) -> ConnectionConfig {
        ConnectionConfig {
            max_retries,
            retry_delay: Duration::from_millis(100),
            health_check_interval: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let connector = InMemoryConnector::default();
        let manager = ConnectionManager::new(Arc::new(connector.clone()), config(3));

        assert!(!manager.is_connected());
        assert!(matches!(
            manager.client(),
            Err(EventBusError::Connection { .. })
        ));

        manager.connect().await.unwrap();
        assert!(manager.is_connected());
        assert!(manager.client().is_ok());

        // idempotent while connected
        manager.connect().await.unwrap();
        assert_eq!(connector.attempts(), 1);

        manager.disconnect().await;
        assert!(!manager.is_connected());
        assert!(manager.client().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_gives_up_after_max_retries_with_doubling_delay() {
        let connector = InMemoryConnector::default();
        connector.broker().set_available(false);
        let manager = ConnectionManager::new(Arc::new(connector.clone()), config(4));

        let started = tokio::time::Instant::now();
        let err = manager.connect().await.unwrap_err();

        assert!(matches!(err, EventBusError::Connection { .. }));
        assert_eq!(connector.attempts(), 4);
        // 100 + 200 + 400 between the four attempts
        assert_eq!(started.elapsed(), Duration::from_millis(700));
        assert!(!manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_check_reconnects_after_outage() {
        let connector = InMemoryConnector::default();
        let manager = ConnectionManager::new(
            Arc::new(connector.clone()),
            ConnectionConfig {
                max_retries: 1,
                retry_delay: Duration::from_millis(10),
                health_check_interval: Duration::from_secs(1),
            },
        );
        manager.connect().await.unwrap();

        connector.broker().set_available(false);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(!manager.is_connected());

        connector.broker().set_available(true);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(manager.is_connected());

        manager.disconnect().await;
    }
}
