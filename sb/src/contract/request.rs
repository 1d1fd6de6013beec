//! Request/response surfaces

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use super::context::InvokeEvent;
use super::{DynamicKey, Evented, HandlerKey};
use crate::bus::{HandleBus, InvokeBus, InvokeContext, RawArgs, RawHandler};
use crate::error::ContractError;
use crate::event::{Args, ArgsOf, Has, Request, encode};
use crate::schema::{HandlerShape, Schema};

/// Handler side of a request channel
pub struct StrictHandler<B: HandleBus, M> {
    bus: B,
    schema: Arc<Schema>,
    marker: Evented<M>,
}

impl<B: HandleBus, M> StrictHandler<B, M> {
    pub(super) fn new(bus: B, schema: Arc<Schema>) -> Self {
        Self {
            bus,
            schema,
            marker: Evented::new(),
        }
    }

    /// Answer every request for `E`
    ///
    /// Fails with `ConflictingHandler` while another handler is registered.
    pub fn handle<E, F, Fut>(&self, handler: F) -> Result<HandlerKey<E>, ContractError>
    where
        M: Has<E>,
        E: Request,
        F: Fn(InvokeEvent, ArgsOf<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = eyre::Result<E::Output>> + Send + 'static,
    {
        debug!(event = E::NAME, "StrictHandler::handle: called");
        let id = self.bus.handle(E::NAME, typed_handler::<E, F, Fut>(handler))?;
        Ok(HandlerKey::new(id))
    }

    /// Answer the next request for `E`, then deregister
    pub fn handle_once<E, F, Fut>(&self, handler: F) -> Result<HandlerKey<E>, ContractError>
    where
        M: Has<E>,
        E: Request,
        F: Fn(InvokeEvent, ArgsOf<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = eyre::Result<E::Output>> + Send + 'static,
    {
        debug!(event = E::NAME, "StrictHandler::handle_once: called");
        let id = self.bus.handle_once(E::NAME, typed_handler::<E, F, Fut>(handler))?;
        Ok(HandlerKey::new(id))
    }

    /// Remove the handler `key` names; a no-op once it is gone
    pub fn remove_handler<E: Request>(&self, key: HandlerKey<E>)
    where
        M: Has<E>,
    {
        debug!(event = E::NAME, id = %key.id(), "StrictHandler::remove_handler: called");
        self.bus.remove_handler(E::NAME, key.id());
    }

    /// Register a handler under a runtime name
    ///
    /// Arguments are checked before the handler runs and the result is checked
    /// against the declared return type.
    pub fn handle_dynamic<F, Fut>(&self, event: &str, handler: F) -> Result<DynamicKey, ContractError>
    where
        F: Fn(InvokeEvent, RawArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = eyre::Result<Value>> + Send + 'static,
    {
        debug!(%event, "StrictHandler::handle_dynamic: called");
        let shape = self.schema.shape(event)?.clone();
        let id = self.bus.handle(event, checked_handler(event, shape, handler))?;
        Ok(DynamicKey::new(event, id))
    }

    pub fn remove_dynamic(&self, key: &DynamicKey) {
        self.bus.remove_handler(key.event(), key.id());
    }

    pub fn raw(&self) -> &B {
        &self.bus
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn evented(&self) -> Evented<M> {
        self.marker
    }
}

fn typed_handler<E, F, Fut>(handler: F) -> RawHandler
where
    E: Request,
    F: Fn(InvokeEvent, ArgsOf<E>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = eyre::Result<E::Output>> + Send + 'static,
{
    Arc::new(move |context: InvokeContext, args: RawArgs| -> BoxFuture<'static, eyre::Result<Value>> {
        match <ArgsOf<E> as Args>::decode(args) {
            Ok(args) => {
                let pending = handler(InvokeEvent::new(context), args);
                Box::pin(async move {
                    let output = pending.await?;
                    Ok(serde_json::to_value(output)?)
                })
            }
            Err(err) => Box::pin(async move { Err(eyre::eyre!("Invalid arguments for '{}': {}", E::NAME, err)) }),
        }
    })
}

fn checked_handler<F, Fut>(event: &str, shape: HandlerShape, handler: F) -> RawHandler
where
    F: Fn(InvokeEvent, RawArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = eyre::Result<Value>> + Send + 'static,
{
    let event = event.to_string();
    Arc::new(move |context: InvokeContext, args: RawArgs| -> BoxFuture<'static, eyre::Result<Value>> {
        if let Err(detail) = shape.check_args(&args) {
            let event = event.clone();
            return Box::pin(async move { Err(eyre::eyre!("Invalid arguments for '{}': {}", event, detail)) });
        }
        let pending = handler(InvokeEvent::new(context), args);
        let shape = shape.clone();
        let event = event.clone();
        Box::pin(async move {
            let value = pending.await?;
            shape
                .check_return(&value)
                .map_err(|detail| eyre::eyre!("Invalid result for '{}': {}", event, detail))?;
            Ok(value)
        })
    })
}

/// Caller side of a request channel
pub struct StrictInvoker<B: InvokeBus, M> {
    bus: B,
    schema: Arc<Schema>,
    marker: Evented<M>,
}

impl<B: InvokeBus, M> StrictInvoker<B, M> {
    pub(super) fn new(bus: B, schema: Arc<Schema>) -> Self {
        Self {
            bus,
            schema,
            marker: Evented::new(),
        }
    }

    /// Invoke the handler for `E` and wait for its result
    ///
    /// Fails fast with `MissingHandler` when nothing handles `E`.
    ///
    /// ```
    /// use strictbus::{ContractError, StrictInvoker, WorkerPort, define_request, event_map};
    ///
    /// define_request!(Add = "add": fn(i64, i64) -> i64);
    /// event_map!(Math { Add });
    ///
    /// async fn sum(invoker: &StrictInvoker<WorkerPort, Math>) -> Result<i64, ContractError> {
    ///     invoker.invoke::<Add>((2, 3)).await
    /// }
    /// ```
    ///
    /// A request outside the map, a wrong argument tuple, or a mismatched
    /// result type does not compile:
    ///
    /// ```compile_fail
    /// # use strictbus::{ContractError, StrictInvoker, WorkerPort, define_request, event_map};
    /// # define_request!(Add = "add": fn(i64, i64) -> i64);
    /// define_request!(Neg = "neg": fn(i64) -> i64);
    /// # event_map!(Math { Add });
    /// async fn negate(invoker: &StrictInvoker<WorkerPort, Math>) -> Result<i64, ContractError> {
    ///     invoker.invoke::<Neg>((2,)).await
    /// }
    /// ```
    ///
    /// ```compile_fail
    /// # use strictbus::{ContractError, StrictInvoker, WorkerPort, define_request, event_map};
    /// # define_request!(Add = "add": fn(i64, i64) -> i64);
    /// # event_map!(Math { Add });
    /// async fn sum(invoker: &StrictInvoker<WorkerPort, Math>) -> Result<i64, ContractError> {
    ///     invoker.invoke::<Add>((2,)).await
    /// }
    /// ```
    ///
    /// ```compile_fail
    /// # use strictbus::{ContractError, StrictInvoker, WorkerPort, define_request, event_map};
    /// # define_request!(Add = "add": fn(i64, i64) -> i64);
    /// # event_map!(Math { Add });
    /// async fn sum(invoker: &StrictInvoker<WorkerPort, Math>) -> Result<i64, ContractError> {
    ///     invoker.invoke::<Add>((2, "3".to_string())).await
    /// }
    /// ```
    ///
    /// ```compile_fail
    /// # use strictbus::{ContractError, StrictInvoker, WorkerPort, define_request, event_map};
    /// # define_request!(Add = "add": fn(i64, i64) -> i64);
    /// # event_map!(Math { Add });
    /// async fn sum(invoker: &StrictInvoker<WorkerPort, Math>) -> Result<String, ContractError> {
    ///     invoker.invoke::<Add>((2, 3)).await
    /// }
    /// ```
    pub async fn invoke<E>(&self, args: ArgsOf<E>) -> Result<E::Output, ContractError>
    where
        M: Has<E>,
        E: Request,
    {
        debug!(event = E::NAME, "StrictInvoker::invoke: called");
        let raw = encode::<E>(args)?;
        let value = self.bus.invoke(E::NAME, raw).await?;
        serde_json::from_value(value).map_err(|err| ContractError::ShapeMismatch {
            event: E::NAME.to_string(),
            detail: format!("result: {}", err),
        })
    }

    /// Invoke under a runtime name, checking arguments and result against the schema
    pub async fn invoke_dynamic(&self, event: &str, args: RawArgs) -> Result<Value, ContractError> {
        debug!(%event, "StrictInvoker::invoke_dynamic: called");
        self.schema.validate_args(event, &args)?;
        let value = self.bus.invoke(event, args).await?;
        self.schema.validate_return(event, &value)?;
        Ok(value)
    }

    pub fn raw(&self) -> &B {
        &self.bus
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn evented(&self) -> Evented<M> {
        self.marker
    }
}
