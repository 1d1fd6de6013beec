//! Contract error types

use thiserror::Error;

use crate::bus::BusError;

/// Errors raised by the contract surfaces
///
/// Everything except `Transport` is detected before a call reaches the bus.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("Unknown event '{event}' for event map {map}")]
    UnknownEvent { map: String, event: String },

    #[error("Shape mismatch for event '{event}': {detail}")]
    ShapeMismatch { event: String, detail: String },

    #[error("No handler registered for '{event}'")]
    MissingHandler { event: String },

    #[error("A handler is already registered for '{event}'")]
    ConflictingHandler { event: String },

    #[error("Event '{event}' declared more than once in event map {map}")]
    DuplicateEvent { map: String, event: String },

    #[error("Failed to encode arguments for '{event}': {source}")]
    Encode {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Bus failure: {0}")]
    Transport(#[source] BusError),
}

impl ContractError {
    /// Check if this error came from the bus rather than the contract
    pub fn is_transport(&self) -> bool {
        matches!(self, ContractError::Transport(_))
    }

    /// Event name the error refers to, if any
    pub fn event(&self) -> Option<&str> {
        match self {
            ContractError::UnknownEvent { event, .. }
            | ContractError::ShapeMismatch { event, .. }
            | ContractError::MissingHandler { event }
            | ContractError::ConflictingHandler { event }
            | ContractError::DuplicateEvent { event, .. }
            | ContractError::Encode { event, .. } => Some(event),
            ContractError::Transport(_) => None,
        }
    }
}

/// Missing and conflicting handlers are contract conditions; every other bus
/// failure passes through untouched.
impl From<BusError> for ContractError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::NoHandler { event } => ContractError::MissingHandler { event },
            BusError::HandlerExists { event } => ContractError::ConflictingHandler { event },
            other => ContractError::Transport(other),
        }
    }
}

/// Failure to decode raw arguments into a typed argument tuple
#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("expected {expected} argument(s), got {found}")]
    Arity { expected: usize, found: usize },

    #[error("argument {index}: {source}")]
    Param {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}
