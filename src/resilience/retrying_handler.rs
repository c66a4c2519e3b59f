//! In-process retries around a handler.
//!
//! [`RetryingHandler`] re-invokes the wrapped handler on failure, sleeping
//! according to its [`ExponentialBackoff`] between attempts. Only when every
//! attempt fails does the worker pool see the failure and apply its own
//! re-delivery policy.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::events::Event;
use crate::registry::handler::{EventHandler, HandlerRef, HandlerResult};
use crate::resilience::backoff::{ExponentialBackoff, RetryPolicy};

pub struct RetryingHandler {
    inner: HandlerRef,
    policy: ExponentialBackoff,
}

impl std::fmt::Debug for RetryingHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingHandler")
            .field("inner", &self.inner.name())
            .field("policy", &self.policy)
            .finish()
    }
}

impl RetryingHandler {
    pub fn new(inner: HandlerRef, policy: ExponentialBackoff) -> Self {
        Self { inner, policy }
    }

    /// Wrap `inner` and return it ready for registration
    pub fn wrap(inner: HandlerRef, policy: ExponentialBackoff) -> HandlerRef {
        Arc::new(Self::new(inner, policy))
    }

    pub fn policy(&self) -> &ExponentialBackoff {
        &self.policy
    }
}

#[async_trait]
impl EventHandler for RetryingHandler {
    async fn handle(&self, event: &Event) -> HandlerResult {
        let mut attempt = 1;
        loop {
            match self.inner.handle(event).await {
                Ok(()) => {
                    if attempt > 1 {
                        debug!(
                            handler = %self.inner.name(),
                            event = %event.name(),
                            attempt = attempt,
                            "Handler succeeded after retry"
                        );
                    }
                    return Ok(());
                }
                Err(e) if self.policy.should_retry(attempt) => {
                    let delay = self.policy.delay_for_attempt(attempt);
                    warn!(
                        handler = %self.inner.name(),
                        event = %event.name(),
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Handler attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
