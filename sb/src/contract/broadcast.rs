//! Broadcast surfaces: controller, worker and the controller's link to a worker

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use tracing::{debug, warn};

use super::context::{ControllerEvent, WorkerEvent};
use super::{DynamicKey, Evented, ListenerKey, send_checked, send_typed};
use crate::bus::{ControllerContext, ListenerBus, ListenerId, RawArgs, RawListener, SendBus, WorkerContext};
use crate::error::ContractError;
use crate::event::{Args, ArgsOf, Event, Has};
use crate::schema::Schema;

type Lift<C, Ctx> = Arc<dyn Fn(C) -> Ctx + Send + Sync>;

/// One-shot slot that is only used up by a payload that passed its check
///
/// The wrapped listener is registered as a persistent listener and removes
/// itself on the first accepted delivery.
struct OnceGate<B> {
    bus: Weak<B>,
    event: String,
    fired: AtomicBool,
    id: OnceLock<ListenerId>,
}

impl<B: ListenerBus> OnceGate<B> {
    fn new(bus: &Arc<B>, event: &str) -> Self {
        Self {
            bus: Arc::downgrade(bus),
            event: event.to_string(),
            fired: AtomicBool::new(false),
            id: OnceLock::new(),
        }
    }

    /// Claim the slot for an accepted delivery; false once it has been claimed
    fn admit(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.retire();
        true
    }

    /// Record the registration id, retiring at once if a delivery won the race
    fn bind(&self, id: ListenerId) {
        let _ = self.id.set(id);
        if self.fired.load(Ordering::SeqCst) {
            self.retire();
        }
    }

    fn retire(&self) {
        if let (Some(id), Some(bus)) = (self.id.get(), self.bus.upgrade()) {
            bus.remove_listener(&self.event, *id);
        }
    }
}

fn admitted<B: ListenerBus>(gate: &Option<Arc<OnceGate<B>>>) -> bool {
    gate.as_ref().is_none_or(|gate| gate.admit())
}

/// Receiving half shared by the controller and worker surfaces
struct Inbound<B: ListenerBus, Ctx> {
    bus: Arc<B>,
    on: Arc<Schema>,
    rejected: Arc<AtomicU64>,
    lift: Lift<B::Context, Ctx>,
}

impl<B: ListenerBus + 'static, Ctx: 'static> Inbound<B, Ctx> {
    fn new(bus: B, on: Arc<Schema>, lift: Lift<B::Context, Ctx>) -> Self {
        Self {
            bus: Arc::new(bus),
            on,
            rejected: Arc::new(AtomicU64::new(0)),
            lift,
        }
    }

    fn register<E, F>(&self, listener: F, once: bool) -> ListenerKey<E>
    where
        E: Event,
        F: Fn(&Ctx, ArgsOf<E>) + Send + Sync + 'static,
    {
        debug!(event = E::NAME, map = self.on.name(), once, "Inbound::register: called");
        let gate = once.then(|| Arc::new(OnceGate::new(&self.bus, E::NAME)));
        let raw = self.typed_listener::<E, F>(listener, gate.clone());
        let id = self.bus.on(E::NAME, raw);
        if let Some(gate) = gate {
            gate.bind(id);
        }
        ListenerKey::new(id)
    }

    /// Wrap a typed listener so it only ever sees arguments of the declared shape
    fn typed_listener<E, F>(&self, listener: F, gate: Option<Arc<OnceGate<B>>>) -> RawListener<B::Context>
    where
        E: Event,
        F: Fn(&Ctx, ArgsOf<E>) + Send + Sync + 'static,
    {
        let lift = Arc::clone(&self.lift);
        let rejected = Arc::clone(&self.rejected);
        Arc::new(move |context: B::Context, args: RawArgs| match <ArgsOf<E> as Args>::decode(args) {
            Ok(args) => {
                if admitted(&gate) {
                    listener(&lift(context), args);
                }
            }
            Err(err) => {
                warn!(event = E::NAME, %err, "Dropping inbound payload with mismatched shape");
                rejected.fetch_add(1, Ordering::Relaxed);
            }
        })
    }

    fn register_dynamic<F>(&self, event: &str, listener: F, once: bool) -> Result<DynamicKey, ContractError>
    where
        F: Fn(&Ctx, RawArgs) + Send + Sync + 'static,
    {
        debug!(%event, map = self.on.name(), once, "Inbound::register_dynamic: called");
        let shape = self.on.shape(event)?.clone();
        let name = event.to_string();
        let lift = Arc::clone(&self.lift);
        let rejected = Arc::clone(&self.rejected);
        let gate = once.then(|| Arc::new(OnceGate::new(&self.bus, event)));
        let admit = gate.clone();
        let raw: RawListener<B::Context> = Arc::new(move |context: B::Context, args: RawArgs| {
            match shape.check_args(&args) {
                Ok(()) => {
                    if admitted(&admit) {
                        listener(&lift(context), args);
                    }
                }
                Err(detail) => {
                    warn!(event = %name, %detail, "Dropping inbound payload with mismatched shape");
                    rejected.fetch_add(1, Ordering::Relaxed);
                }
            }
        });
        let id = self.bus.on(event, raw);
        if let Some(gate) = gate {
            gate.bind(id);
        }
        Ok(DynamicKey::new(event, id))
    }

    fn remove<E: Event>(&self, key: ListenerKey<E>) {
        self.bus.remove_listener(E::NAME, key.id());
    }

    fn remove_dynamic(&self, key: &DynamicKey) {
        self.bus.remove_listener(key.event(), key.id());
    }

    fn remove_all(&self, event: &str) {
        self.bus.remove_all_listeners(event);
    }

    fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Generates the listener half shared by the controller and worker surfaces
macro_rules! listener_methods {
    ($ctx:ty, $(#[$on_meta:meta])+) => {
        $(#[$on_meta])+
        pub fn on<E, F>(&self, listener: F) -> ListenerKey<E>
        where
            On: Has<E>,
            E: Event,
            F: Fn(&$ctx, ArgsOf<E>) + Send + Sync + 'static,
        {
            self.inbound.register::<E, F>(listener, false)
        }

        /// Register `listener` for the next delivery of `E` only
        pub fn once<E, F>(&self, listener: F) -> ListenerKey<E>
        where
            On: Has<E>,
            E: Event,
            F: Fn(&$ctx, ArgsOf<E>) + Send + Sync + 'static,
        {
            self.inbound.register::<E, F>(listener, true)
        }

        /// Remove one listener; removing it twice is a no-op
        pub fn remove_listener<E: Event>(&self, key: ListenerKey<E>)
        where
            On: Has<E>,
        {
            self.inbound.remove(key);
        }

        pub fn remove_all_listeners<E: Event>(&self)
        where
            On: Has<E>,
        {
            self.inbound.remove_all(E::NAME);
        }

        /// Register a listener under a runtime name, checked against the inbound schema
        pub fn on_dynamic<F>(&self, event: &str, listener: F) -> Result<DynamicKey, ContractError>
        where
            F: Fn(&$ctx, RawArgs) + Send + Sync + 'static,
        {
            self.inbound.register_dynamic(event, listener, false)
        }

        pub fn once_dynamic<F>(&self, event: &str, listener: F) -> Result<DynamicKey, ContractError>
        where
            F: Fn(&$ctx, RawArgs) + Send + Sync + 'static,
        {
            self.inbound.register_dynamic(event, listener, true)
        }

        pub fn remove_dynamic(&self, key: &DynamicKey) {
            self.inbound.remove_dynamic(key);
        }

        /// Remove every listener for a runtime name
        pub fn remove_all_dynamic(&self, event: &str) -> Result<(), ContractError> {
            self.inbound.on.shape(event)?;
            self.inbound.remove_all(event);
            Ok(())
        }

        /// Unchecked access to the underlying bus
        pub fn raw(&self) -> &B {
            self.inbound.bus.as_ref()
        }

        /// Inbound payloads dropped because they did not match their declared shape
        pub fn rejected(&self) -> u64 {
            self.inbound.rejected()
        }

        pub fn schema(&self) -> &Schema {
            &self.inbound.on
        }

        pub fn evented(&self) -> Evented<On, Emit> {
            self.marker
        }
    };
}

/// Controller side of a broadcast channel
pub struct StrictController<B: ListenerBus<Context = ControllerContext>, On, Emit = On> {
    inbound: Inbound<B, ControllerEvent<Emit>>,
    marker: Evented<On, Emit>,
}

impl<B, On, Emit> StrictController<B, On, Emit>
where
    B: ListenerBus<Context = ControllerContext> + 'static,
    Emit: 'static,
{
    pub(super) fn new(bus: B, on: Arc<Schema>, emit: Arc<Schema>) -> Self {
        let lift: Lift<ControllerContext, ControllerEvent<Emit>> =
            Arc::new(move |raw: ControllerContext| ControllerEvent::new(raw, Arc::clone(&emit)));
        Self {
            inbound: Inbound::new(bus, on, lift),
            marker: Evented::new(),
        }
    }

    listener_methods!(
        ControllerEvent<Emit>,
        /// Register `listener` for every delivery of `E`
        ///
        /// `E` must be in the inbound map and the listener takes exactly its
        /// argument tuple. Replies are checked against the outbound map.
        ///
        /// ```
        /// use strictbus::{ControllerPort, StrictController, event_map};
        ///
        /// event_map!(Inbox { A = "a": fn(i64) });
        /// event_map!(Outbox { B = "b": fn(String) });
        ///
        /// fn wire(controller: &StrictController<ControllerPort, Inbox, Outbox>) {
        ///     controller.on::<A, _>(|event, (n,)| {
        ///         let _ = event.reply::<B>((n.to_string(),));
        ///     });
        /// }
        /// ```
        ///
        /// An event the controller does not receive is rejected:
        ///
        /// ```compile_fail
        /// # use strictbus::{ControllerPort, StrictController, event_map};
        /// # event_map!(Inbox { A = "a": fn(i64) });
        /// # event_map!(Outbox { B = "b": fn(String) });
        /// fn wire(controller: &StrictController<ControllerPort, Inbox, Outbox>) {
        ///     controller.on::<B, _>(|_, (s,)| drop(s));
        /// }
        /// ```
        ///
        /// So is a listener with the wrong arity or argument type:
        ///
        /// ```compile_fail
        /// # use strictbus::{ControllerPort, StrictController, event_map};
        /// # event_map!(Inbox { A = "a": fn(i64) });
        /// # event_map!(Outbox { B = "b": fn(String) });
        /// fn wire(controller: &StrictController<ControllerPort, Inbox, Outbox>) {
        ///     controller.on::<A, _>(|_, (n, m): (i64, i64)| drop((n, m)));
        /// }
        /// ```
        ///
        /// ```compile_fail
        /// # use strictbus::{ControllerPort, StrictController, event_map};
        /// # event_map!(Inbox { A = "a": fn(i64) });
        /// # event_map!(Outbox { B = "b": fn(String) });
        /// fn wire(controller: &StrictController<ControllerPort, Inbox, Outbox>) {
        ///     controller.on::<A, _>(|_, (s,): (String,)| drop(s));
        /// }
        /// ```
        ///
        /// And a reply with an event the controller does not send:
        ///
        /// ```compile_fail
        /// # use strictbus::{ControllerPort, StrictController, event_map};
        /// # event_map!(Inbox { A = "a": fn(i64) });
        /// # event_map!(Outbox { B = "b": fn(String) });
        /// fn wire(controller: &StrictController<ControllerPort, Inbox, Outbox>) {
        ///     controller.on::<A, _>(|event, (n,)| {
        ///         let _ = event.reply::<A>((n,));
        ///     });
        /// }
        /// ```
    );
}

/// Worker side of a broadcast channel
pub struct StrictWorker<B: ListenerBus<Context = WorkerContext> + SendBus, On, Emit = On> {
    inbound: Inbound<B, WorkerEvent>,
    emit: Arc<Schema>,
    marker: Evented<On, Emit>,
}

impl<B, On, Emit> StrictWorker<B, On, Emit>
where
    B: ListenerBus<Context = WorkerContext> + SendBus + 'static,
{
    pub(super) fn new(bus: B, on: Arc<Schema>, emit: Arc<Schema>) -> Self {
        let lift: Lift<WorkerContext, WorkerEvent> = Arc::new(WorkerEvent::new);
        Self {
            inbound: Inbound::new(bus, on, lift),
            emit,
            marker: Evented::new(),
        }
    }

    listener_methods!(
        WorkerEvent,
        /// Register `listener` for every delivery of `E`
    );

    /// Fire-and-forget send to the controller
    ///
    /// ```
    /// use strictbus::{ContractError, StrictWorker, WorkerPort, event_map};
    ///
    /// event_map!(Inbox { A = "a": fn(i64) });
    /// event_map!(Outbox { B = "b": fn(String) });
    ///
    /// fn finish(worker: &StrictWorker<WorkerPort, Inbox, Outbox>) -> Result<(), ContractError> {
    ///     worker.send::<B>(("done".to_string(),))
    /// }
    /// ```
    ///
    /// Sending an event outside the outbound map does not compile:
    ///
    /// ```compile_fail
    /// # use strictbus::{ContractError, StrictWorker, WorkerPort, event_map};
    /// # event_map!(Inbox { A = "a": fn(i64) });
    /// # event_map!(Outbox { B = "b": fn(String) });
    /// fn finish(worker: &StrictWorker<WorkerPort, Inbox, Outbox>) -> Result<(), ContractError> {
    ///     worker.send::<A>((1,))
    /// }
    /// ```
    ///
    /// Neither does an argument tuple of the wrong type or arity:
    ///
    /// ```compile_fail
    /// # use strictbus::{ContractError, StrictWorker, WorkerPort, event_map};
    /// # event_map!(Inbox { A = "a": fn(i64) });
    /// # event_map!(Outbox { B = "b": fn(String) });
    /// fn finish(worker: &StrictWorker<WorkerPort, Inbox, Outbox>) -> Result<(), ContractError> {
    ///     worker.send::<B>((1,))
    /// }
    /// ```
    ///
    /// ```compile_fail
    /// # use strictbus::{ContractError, StrictWorker, WorkerPort, event_map};
    /// # event_map!(Inbox { A = "a": fn(i64) });
    /// # event_map!(Outbox { B = "b": fn(String) });
    /// fn finish(worker: &StrictWorker<WorkerPort, Inbox, Outbox>) -> Result<(), ContractError> {
    ///     worker.send::<B>(("done".to_string(), 2))
    /// }
    /// ```
    pub fn send<E: Event>(&self, args: ArgsOf<E>) -> Result<(), ContractError>
    where
        Emit: Has<E>,
    {
        send_typed::<E, B>(self.inbound.bus.as_ref(), args)
    }

    /// Send under a runtime name, checked against the outbound schema
    pub fn send_dynamic(&self, event: &str, args: RawArgs) -> Result<(), ContractError> {
        send_checked(self.inbound.bus.as_ref(), &self.emit, event, args)
    }
}

/// The controller's outbound view of one worker
pub struct WorkerLink<B: SendBus, Emit> {
    bus: B,
    emit: Arc<Schema>,
    marker: Evented<(), Emit>,
}

impl<B: SendBus, Emit> WorkerLink<B, Emit> {
    pub(super) fn new(bus: B, emit: Arc<Schema>) -> Self {
        Self {
            bus,
            emit,
            marker: Evented::new(),
        }
    }

    pub fn send<E: Event>(&self, args: ArgsOf<E>) -> Result<(), ContractError>
    where
        Emit: Has<E>,
    {
        send_typed::<E, B>(&self.bus, args)
    }

    pub fn send_dynamic(&self, event: &str, args: RawArgs) -> Result<(), ContractError> {
        send_checked(&self.bus, &self.emit, event, args)
    }

    pub fn raw(&self) -> &B {
        &self.bus
    }

    pub fn schema(&self) -> &Schema {
        &self.emit
    }

    pub fn evented(&self) -> Evented<(), Emit> {
        self.marker
    }
}
