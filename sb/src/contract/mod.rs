//! Typed contract surfaces
//!
//! A [`Contract`] is built once from a pair of event maps: `On`, the events a
//! side of the channel receives, and `Emit`, the events it may send. It then
//! wraps raw bus handles into typed surfaces:
//!
//! | surface | raw bus | operations |
//! |---|---|---|
//! | [`StrictController`] | `ListenerBus<Context = ControllerContext>` | `on`, `once`, `remove_listener`, `remove_all_listeners` |
//! | [`StrictWorker`] | `ListenerBus<Context = WorkerContext> + SendBus` | the four above plus `send` |
//! | [`WorkerLink`] | `SendBus` | `send` |
//! | [`StrictHandler`] | `HandleBus` | `handle`, `handle_once`, `remove_handler` |
//! | [`StrictInvoker`] | `InvokeBus` | `invoke` |
//!
//! Typed calls only accept events the map declares (`Has<E>`) with exactly the
//! declared argument tuple. Names that are only known at runtime go through the
//! `*_dynamic` methods, which check the schema table before touching the bus,
//! or through `raw()`, which checks nothing.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::bus::{
    ControllerContext, HandleBus, InvokeBus, ListenerBus, ListenerId, RawArgs, SendBus, WorkerContext,
};
use crate::error::ContractError;
use crate::event::{ArgsOf, Event, EventMap, encode};
use crate::schema::Schema;

mod broadcast;
mod context;
mod request;

pub use broadcast::{StrictController, StrictWorker, WorkerLink};
pub use context::{ControllerEvent, InvokeEvent, WorkerEvent};
pub use request::{StrictHandler, StrictInvoker};

/// Marker relating a surface to the maps it receives (`On`) and emits (`Emit`)
pub struct Evented<On, Emit = On>(PhantomData<fn() -> (On, Emit)>);

impl<On, Emit> Evented<On, Emit> {
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<On, Emit> Clone for Evented<On, Emit> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<On, Emit> Copy for Evented<On, Emit> {}

impl<On, Emit> Default for Evented<On, Emit> {
    fn default() -> Self {
        Self::new()
    }
}

impl<On, Emit> fmt::Debug for Evented<On, Emit> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Evented<{}, {}>",
            std::any::type_name::<On>(),
            std::any::type_name::<Emit>()
        )
    }
}

/// Channel factory closing over the schema tables of both maps
pub struct Contract<On, Emit = On> {
    on: Arc<Schema>,
    emit: Arc<Schema>,
    marker: Evented<On, Emit>,
}

impl<On, Emit> Clone for Contract<On, Emit> {
    fn clone(&self) -> Self {
        Self {
            on: Arc::clone(&self.on),
            emit: Arc::clone(&self.emit),
            marker: self.marker,
        }
    }
}

impl<On, Emit> fmt::Debug for Contract<On, Emit> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contract")
            .field("on", &self.on.name())
            .field("emit", &self.emit.name())
            .finish()
    }
}

impl<On: EventMap, Emit: EventMap> Contract<On, Emit> {
    /// Build both schema tables
    ///
    /// Fails with `DuplicateEvent` when a map declares one name twice.
    pub fn new() -> Result<Self, ContractError> {
        debug!(on = On::NAME, emit = Emit::NAME, "Contract::new: called");
        Ok(Self {
            on: Arc::new(Schema::of::<On>()?),
            emit: Arc::new(Schema::of::<Emit>()?),
            marker: Evented::new(),
        })
    }

    /// Schema of the events this side receives
    pub fn inbound(&self) -> &Schema {
        &self.on
    }

    /// Schema of the events this side sends
    pub fn outbound(&self) -> &Schema {
        &self.emit
    }

    /// The same channel seen from the other end
    pub fn reversed(&self) -> Contract<Emit, On> {
        Contract {
            on: Arc::clone(&self.emit),
            emit: Arc::clone(&self.on),
            marker: Evented::new(),
        }
    }

    pub fn controller<B>(&self, bus: B) -> StrictController<B, On, Emit>
    where
        B: ListenerBus<Context = ControllerContext> + 'static,
    {
        StrictController::new(bus, Arc::clone(&self.on), Arc::clone(&self.emit))
    }

    pub fn worker<B>(&self, bus: B) -> StrictWorker<B, On, Emit>
    where
        B: ListenerBus<Context = WorkerContext> + SendBus + 'static,
    {
        StrictWorker::new(bus, Arc::clone(&self.on), Arc::clone(&self.emit))
    }

    /// Outbound-only surface, e.g. the controller's path to one worker
    pub fn link<B: SendBus>(&self, bus: B) -> WorkerLink<B, Emit> {
        WorkerLink::new(bus, Arc::clone(&self.emit))
    }
}

impl<M: EventMap> Contract<M, M> {
    pub fn handler<B: HandleBus>(&self, bus: B) -> StrictHandler<B, M> {
        StrictHandler::new(bus, Arc::clone(&self.on))
    }

    pub fn invoker<B: InvokeBus>(&self, bus: B) -> StrictInvoker<B, M> {
        StrictInvoker::new(bus, Arc::clone(&self.on))
    }
}

macro_rules! typed_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        pub struct $name<E> {
            id: ListenerId,
            event: PhantomData<fn() -> E>,
        }

        impl<E: Event> $name<E> {
            pub(crate) fn new(id: ListenerId) -> Self {
                Self { id, event: PhantomData }
            }

            pub fn id(&self) -> ListenerId {
                self.id
            }

            pub fn event(&self) -> &'static str {
                E::NAME
            }
        }

        impl<E> Clone for $name<E> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<E> Copy for $name<E> {}

        impl<E> PartialEq for $name<E> {
            fn eq(&self, other: &Self) -> bool {
                self.id == other.id
            }
        }

        impl<E> Eq for $name<E> {}

        impl<E: Event> fmt::Debug for $name<E> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("event", &E::NAME)
                    .field("id", &self.id)
                    .finish()
            }
        }
    };
}

typed_key!(
    /// Identity of a typed listener, used to remove it
    ListenerKey
);

typed_key!(
    /// Identity of a typed request handler
    HandlerKey
);

/// Identity of a listener or handler registered under a runtime name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DynamicKey {
    event: String,
    id: ListenerId,
}

impl DynamicKey {
    fn new(event: &str, id: ListenerId) -> Self {
        Self {
            event: event.to_string(),
            id,
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }
}

fn send_typed<E: Event, B: SendBus + ?Sized>(bus: &B, args: ArgsOf<E>) -> Result<(), ContractError> {
    debug!(event = E::NAME, "send_typed: called");
    let raw = encode::<E>(args)?;
    bus.send(E::NAME, raw)?;
    Ok(())
}

fn send_checked<B: SendBus + ?Sized>(bus: &B, schema: &Schema, event: &str, args: RawArgs) -> Result<(), ContractError> {
    debug!(%event, map = schema.name(), "send_checked: called");
    schema.validate_args(event, &args)?;
    bus.send(event, args)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::event_map!(Inbound {
        Tick = "tick": fn(u32),
    });
    crate::event_map!(Outbound {
        Tock = "tock": fn(String),
    });
    crate::define_event!(Twice = "tick": fn(String));
    crate::event_map!(Broken { Tick, Twice });

    #[test]
    fn test_contract_schemas() {
        let contract = Contract::<Inbound, Outbound>::new().unwrap();
        assert!(contract.inbound().contains("tick"));
        assert!(contract.outbound().contains("tock"));
        assert!(!contract.inbound().contains("tock"));

        let reversed = contract.reversed();
        assert!(reversed.inbound().contains("tock"));
        assert!(reversed.outbound().contains("tick"));
    }

    #[test]
    fn test_duplicate_event_fails_contract() {
        let err = Contract::<Broken>::new().unwrap_err();
        assert!(matches!(err, ContractError::DuplicateEvent { .. }));
    }

    #[test]
    fn test_keys() {
        let key = ListenerKey::<Tick>::new(ListenerId::from_raw(4));
        let copy = key;
        assert_eq!(key, copy);
        assert_eq!(key.event(), "tick");
        assert_eq!(key.id().get(), 4);

        let dynamic = DynamicKey::new("tock", ListenerId::from_raw(5));
        assert_eq!(dynamic.event(), "tock");
    }

    #[test]
    fn test_evented_is_zero_sized() {
        assert_eq!(std::mem::size_of::<Evented<Inbound, Outbound>>(), 0);
        let marker: Evented<Inbound> = Evented::default();
        assert!(format!("{:?}", marker).starts_with("Evented<"));
    }
}
