//! Typed call-site contexts

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use uuid::Uuid;

use super::{send_checked, send_typed};
use crate::bus::{ControllerContext, EndpointId, InvokeContext, RawArgs, WorkerContext};
use crate::error::ContractError;
use crate::event::{ArgsOf, Event, Has};
use crate::schema::Schema;

/// A broadcast received by the controller
///
/// `reply` sends back to the worker that raised the event, checked against the
/// controller's outbound map.
pub struct ControllerEvent<Emit> {
    raw: ControllerContext,
    emit: Arc<Schema>,
    marker: PhantomData<fn() -> Emit>,
}

impl<Emit> ControllerEvent<Emit> {
    pub(crate) fn new(raw: ControllerContext, emit: Arc<Schema>) -> Self {
        Self {
            raw,
            emit,
            marker: PhantomData,
        }
    }

    pub fn sender(&self) -> &EndpointId {
        &self.raw.sender
    }

    pub fn reply<E: Event>(&self, args: ArgsOf<E>) -> Result<(), ContractError>
    where
        Emit: Has<E>,
    {
        send_typed::<E, _>(self.raw.reply.as_ref(), args)
    }

    pub fn reply_dynamic(&self, event: &str, args: RawArgs) -> Result<(), ContractError> {
        send_checked(self.raw.reply.as_ref(), &self.emit, event, args)
    }

    pub fn raw(&self) -> &ControllerContext {
        &self.raw
    }
}

impl<Emit> fmt::Debug for ControllerEvent<Emit> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerEvent")
            .field("sender", &self.raw.sender)
            .field("emit", &self.emit.name())
            .finish()
    }
}

/// A broadcast received by a worker
#[derive(Debug, Clone)]
pub struct WorkerEvent {
    raw: WorkerContext,
}

impl WorkerEvent {
    pub(crate) fn new(raw: WorkerContext) -> Self {
        Self { raw }
    }

    pub fn sender(&self) -> &EndpointId {
        &self.raw.sender
    }

    pub fn raw(&self) -> &WorkerContext {
        &self.raw
    }
}

/// A request received by a handler
#[derive(Debug, Clone)]
pub struct InvokeEvent {
    raw: InvokeContext,
}

impl InvokeEvent {
    pub(crate) fn new(raw: InvokeContext) -> Self {
        Self { raw }
    }

    pub fn sender(&self) -> &EndpointId {
        &self.raw.sender
    }

    pub fn request_id(&self) -> Uuid {
        self.raw.request_id
    }

    pub fn raw(&self) -> &InvokeContext {
        &self.raw
    }
}
