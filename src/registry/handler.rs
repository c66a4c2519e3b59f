//! # Event Handlers
//!
//! The capability a subscriber provides: `handle(event) -> Result`. Handlers
//! are registered explicitly against a pattern; nothing is discovered at
//! runtime.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::events::Event;

/// Business-logic failure raised by a handler.
///
/// Displays as the bare message, which is what lands in a dead-lettered
/// event's `error` field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
    pub handler: Option<String>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            handler: None,
        }
    }

    /// Tag the error with the name of the handler that raised it
    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Result returned by handlers
pub type HandlerResult = Result<(), HandlerError>;

/// An event consumer
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process one event
    async fn handle(&self, event: &Event) -> HandlerResult;

    /// Handler name for identification in logs and errors
    fn name(&self) -> &str {
        "unnamed_handler"
    }
}

/// Shared handle to a registered handler; identity is pointer identity
pub type HandlerRef = Arc<dyn EventHandler>;

/// Handler backed by an async closure
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, event: &Event) -> HandlerResult {
        (self.f)(event.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Wrap an async closure as a [`HandlerRef`]
///
/// ```rust
/// use relay_core::registry::handler_fn;
///
/// let handler = handler_fn("audit", |event| async move {
///     tracing::info!(event = %event.name(), "audited");
///     Ok(())
/// });
/// assert_eq!(handler.name(), "audit");
/// ```
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> HandlerRef
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        f,
    })
}

/// Whether two handler references point at the same handler
pub fn same_handler(a: &HandlerRef, b: &HandlerRef) -> bool {
    // compare data pointers only; vtable pointers are not unique
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_handler_fn_invokes_closure() {
        let handler = handler_fn("echo", |event| async move {
            if event.name() == "fail.me" {
                Err(HandlerError::new("asked to fail"))
            } else {
                Ok(())
            }
        });

        assert!(handler.handle(&Event::new("ok.event", json!({}))).await.is_ok());
        let err = handler
            .handle(&Event::new("fail.me", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "asked to fail");
    }

    #[test]
    fn test_handler_identity() {
        let a = handler_fn("a", |_| async { Ok(()) });
        let b = handler_fn("a", |_| async { Ok(()) });
        assert!(same_handler(&a, &a.clone()));
        assert!(!same_handler(&a, &b));
    }

    #[test]
    fn test_handler_error_tagging() {
        let err = HandlerError::from("boom").with_handler("mailer");
        assert_eq!(err.handler.as_deref(), Some("mailer"));
        assert_eq!(err.to_string(), "boom");
    }
}
