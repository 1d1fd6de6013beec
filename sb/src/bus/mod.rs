//! Untyped bus primitives
//!
//! The contract layer sits on top of these traits and compiles every typed call
//! down to exactly one of them:
//!
//! - [`ListenerBus`]: `on`, `once`, `remove_listener`, `remove_all_listeners`
//! - [`SendBus`]: `send`
//! - [`HandleBus`]: `handle`, `handle_once`, `remove_handler`
//! - [`InvokeBus`]: `invoke`
//!
//! Events are addressed by free-form names and carry a list of JSON values.
//! [`local::LocalHub`] implements all four in-process.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod config;
mod context;
mod error;
pub mod local;

pub use config::BusConfig;
pub use context::{ControllerContext, InvokeContext, WorkerContext};
pub use error::BusError;

/// Untyped argument list
pub type RawArgs = Vec<Value>;

/// Untyped listener, receiving the bus context and the raw arguments
pub type RawListener<C> = Arc<dyn Fn(C, RawArgs) + Send + Sync>;

/// Untyped request handler
pub type RawHandler = Arc<dyn Fn(InvokeContext, RawArgs) -> BoxFuture<'static, eyre::Result<Value>> + Send + Sync>;

/// Identity of a registered listener or handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Name of a controller or worker endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointId(String);

impl EndpointId {
    pub const CONTROLLER: &'static str = "controller";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn controller() -> Self {
        Self(Self::CONTROLLER.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_controller(&self) -> bool {
        self.0 == Self::CONTROLLER
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Broadcast subscription primitives
///
/// Removing an id that is not registered is a no-op.
pub trait ListenerBus: Send + Sync {
    /// Context value handed to every listener on this side of the channel
    type Context: Clone + Send + 'static;

    fn on(&self, event: &str, listener: RawListener<Self::Context>) -> ListenerId;

    fn once(&self, event: &str, listener: RawListener<Self::Context>) -> ListenerId;

    fn remove_listener(&self, event: &str, id: ListenerId);

    fn remove_all_listeners(&self, event: &str);
}

/// Fire-and-forget delivery
pub trait SendBus: Send + Sync {
    fn send(&self, event: &str, args: RawArgs) -> Result<(), BusError>;
}

/// Request handler registration
///
/// At most one live handler per event name; a second registration fails with
/// [`BusError::HandlerExists`].
pub trait HandleBus: Send + Sync {
    fn handle(&self, event: &str, handler: RawHandler) -> Result<ListenerId, BusError>;

    fn handle_once(&self, event: &str, handler: RawHandler) -> Result<ListenerId, BusError>;

    fn remove_handler(&self, event: &str, id: ListenerId);
}

/// Request/response invocation
///
/// Fails with [`BusError::NoHandler`] instead of waiting when nothing handles `event`.
#[async_trait]
pub trait InvokeBus: Send + Sync {
    async fn invoke(&self, event: &str, args: RawArgs) -> Result<Value, BusError>;
}
