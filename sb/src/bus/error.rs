//! Bus error types

use std::time::Duration;

use thiserror::Error;

use super::EndpointId;

/// Errors reported by the untyped bus
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("No handler registered for '{event}'")]
    NoHandler { event: String },

    #[error("Handler already registered for '{event}'")]
    HandlerExists { event: String },

    #[error("Invoke timed out after {0:?}")]
    Timeout(Duration),

    #[error("Handler failed: {0}")]
    HandlerFailed(String),

    #[error("Endpoint {0} is gone")]
    EndpointGone(EndpointId),

    #[error("Queue for endpoint {0} is full")]
    QueueFull(EndpointId),

    #[error("Bus closed")]
    Closed,
}

impl BusError {
    /// Check if retrying the same call later could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, BusError::Timeout(_) | BusError::QueueFull(_))
    }
}
