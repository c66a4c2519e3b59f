//! # Error Types
//!
//! Error taxonomy for event publishing, queueing and delivery.
//!
//! Only control-plane failures (`Connection`, `Broker`) abort a worker loop
//! iteration. `Serialization` and `Handler` failures are scoped to a single
//! event and are converted into dead-letter or retry transitions by the queue
//! and the worker pool.

use thiserror::Error;

use crate::messaging::broker::BrokerError;
use crate::registry::handler::HandlerError;

/// Errors surfaced by the event relay
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventBusError {
    #[error("Broker connection error: {message}")]
    Connection { message: String },

    #[error("Failed to publish event '{event_name}': {message}")]
    Publish { event_name: String, message: String },

    #[error("Event serialization error: {message}")]
    Serialization { message: String },

    #[error("Handler '{handler}' failed: {message}")]
    Handler { handler: String, message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Configuration error: {component}: {message}")]
    Configuration { component: String, message: String },

    #[error("Broker command failed: {operation}: {message}")]
    Broker { operation: String, message: String },
}

impl EventBusError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a publish error for the named event
    pub fn publish(event_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Publish {
            event_name: event_name.into(),
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a handler error
    pub fn handler(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handler {
            handler: handler.into(),
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a broker command error
    pub fn broker(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Broker {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Whether the failure is a control-plane failure (broker unreachable or
    /// rejecting commands) rather than one scoped to a single event.
    pub fn is_control_plane(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Broker { .. })
    }
}

impl From<serde_json::Error> for EventBusError {
    fn from(err: serde_json::Error) -> Self {
        EventBusError::serialization(err.to_string())
    }
}

impl From<BrokerError> for EventBusError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Unavailable { message } => EventBusError::connection(message),
            BrokerError::Command { operation, message } => {
                EventBusError::broker(operation, message)
            }
        }
    }
}

impl From<HandlerError> for EventBusError {
    fn from(err: HandlerError) -> Self {
        let handler = err.handler.unwrap_or_else(|| "anonymous".to_string());
        EventBusError::handler(handler, err.message)
    }
}

impl From<config::ConfigError> for EventBusError {
    fn from(err: config::ConfigError) -> Self {
        EventBusError::configuration("loader", err.to_string())
    }
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, EventBusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let conn_err = EventBusError::connection("refused");
        assert!(matches!(conn_err, EventBusError::Connection { .. }));
        assert!(conn_err.is_control_plane());

        let publish_err = EventBusError::publish("user.created", "broker write failed");
        assert!(!publish_err.is_control_plane());
    }

    #[test]
    fn test_error_conversions() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid json").unwrap_err();
        let err: EventBusError = json_err.into();
        assert!(matches!(err, EventBusError::Serialization { .. }));

        let err: EventBusError = BrokerError::unavailable("down").into();
        assert!(matches!(err, EventBusError::Connection { .. }));

        let err: EventBusError = BrokerError::command("LMOVE", "WRONGTYPE").into();
        assert!(matches!(err, EventBusError::Broker { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = EventBusError::publish("order.placed", "queue unavailable");
        let display = format!("{err}");
        assert!(display.contains("order.placed"));
        assert!(display.contains("queue unavailable"));

        let err = EventBusError::handler("mailer", "smtp timeout");
        assert_eq!(format!("{err}"), "Handler 'mailer' failed: smtp timeout");
    }
}
