//! Call-site contexts handed to raw listeners and handlers

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use super::{EndpointId, SendBus};

/// Context of a broadcast received by the controller
///
/// Carries the sending worker and a path to send back to it.
#[derive(Clone)]
pub struct ControllerContext {
    pub sender: EndpointId,
    pub reply: Arc<dyn SendBus>,
}

impl fmt::Debug for ControllerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerContext")
            .field("sender", &self.sender)
            .finish_non_exhaustive()
    }
}

/// Context of a broadcast received by a worker
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub sender: EndpointId,
}

/// Context of a request received by a handler
#[derive(Debug, Clone)]
pub struct InvokeContext {
    pub sender: EndpointId,
    pub request_id: Uuid,
}
