//! LocalHub - in-process controller/worker bus

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::metrics::{BusMetrics, Counters};
use super::registry::{HandlerTable, ListenerTable, lock};
use crate::bus::{
    BusConfig, BusError, ControllerContext, EndpointId, HandleBus, InvokeBus, InvokeContext, ListenerBus, ListenerId,
    RawArgs, RawHandler, RawListener, SendBus, WorkerContext,
};

/// One queued broadcast
struct Delivery<C> {
    event: String,
    context: C,
    args: RawArgs,
}

/// A receiving side of the bus: its listeners plus the pump feeding them
struct Endpoint<C> {
    id: EndpointId,
    table: Arc<Mutex<ListenerTable<C>>>,
    tx: mpsc::Sender<Delivery<C>>,
    stop: watch::Sender<bool>,
}

impl<C: Clone + Send + 'static> Endpoint<C> {
    /// Create the endpoint and spawn its pump task
    ///
    /// One pump per endpoint keeps deliveries to that endpoint in send order.
    fn spawn(id: EndpointId, buffer: usize, counters: Arc<Counters>) -> Arc<Self> {
        debug!(endpoint = %id, buffer, "Endpoint::spawn: called");
        let (tx, mut rx) = mpsc::channel::<Delivery<C>>(buffer.max(1));
        let (stop, mut stopped) = watch::channel(false);
        let table = Arc::new(Mutex::new(ListenerTable::default()));

        let pump_table = Arc::clone(&table);
        let pump_id = id.clone();
        tokio::spawn(async move {
            debug!(endpoint = %pump_id, "Endpoint pump started");
            loop {
                tokio::select! {
                    delivery = rx.recv() => {
                        let Some(delivery) = delivery else {
                            break;
                        };
                        dispatch(&pump_id, &pump_table, &counters, delivery);
                    }
                    _ = stopped.changed() => break,
                }
            }
            debug!(endpoint = %pump_id, "Endpoint pump stopped");
        });

        Arc::new(Self { id, table, tx, stop })
    }

    fn deliver(&self, event: &str, context: C, args: RawArgs) -> Result<(), BusError> {
        if self.is_stopped() {
            return Err(BusError::EndpointGone(self.id.clone()));
        }
        self.tx
            .try_send(Delivery {
                event: event.to_string(),
                context,
                args,
            })
            .map_err(|err| match err {
                TrySendError::Full(_) => BusError::QueueFull(self.id.clone()),
                TrySendError::Closed(_) => BusError::EndpointGone(self.id.clone()),
            })
    }

    fn add_listener(&self, event: &str, id: ListenerId, once: bool, listener: RawListener<C>) {
        debug!(endpoint = %self.id, %event, %id, once, "Endpoint::add_listener: called");
        lock(&self.table).add(event, id, once, listener);
    }

    fn remove_listener(&self, event: &str, id: ListenerId) {
        let removed = lock(&self.table).remove(event, id);
        debug!(endpoint = %self.id, %event, %id, removed, "Endpoint::remove_listener: called");
    }

    fn remove_all_listeners(&self, event: &str) {
        let removed = lock(&self.table).clear(event);
        debug!(endpoint = %self.id, %event, removed, "Endpoint::remove_all_listeners: called");
    }

    fn listener_count(&self) -> usize {
        lock(&self.table).len()
    }

    fn stop(&self) {
        self.stop.send_replace(true);
    }

    fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }
}

/// Call every listener registered for one delivery, outside the table lock
fn dispatch<C: Clone>(endpoint: &EndpointId, table: &Mutex<ListenerTable<C>>, counters: &Counters, delivery: Delivery<C>) {
    let listeners = lock(table).take_for_dispatch(&delivery.event);
    if listeners.is_empty() {
        debug!(%endpoint, event = %delivery.event, "dispatch: no listeners");
        return;
    }

    for listener in listeners {
        let context = delivery.context.clone();
        let args = delivery.args.clone();
        match std::panic::catch_unwind(AssertUnwindSafe(|| listener(context, args))) {
            Ok(()) => Counters::bump(&counters.messages_delivered),
            Err(_) => {
                warn!(%endpoint, event = %delivery.event, "Listener panicked");
                Counters::bump(&counters.listener_panics);
            }
        }
    }
}

struct HubInner {
    config: BusConfig,
    next_id: AtomicU64,
    worker_seq: AtomicU64,
    closed: AtomicBool,
    controller: Arc<Endpoint<ControllerContext>>,
    handlers: Mutex<HandlerTable>,
    workers: Mutex<HashMap<EndpointId, Arc<Endpoint<WorkerContext>>>>,
    counters: Arc<Counters>,
}

impl HubInner {
    fn next_listener_id(&self) -> ListenerId {
        ListenerId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn register_handler(&self, event: &str, handler: RawHandler, once: bool) -> Result<ListenerId, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        let id = self.next_listener_id();
        lock(&self.handlers).insert(event, id, once, handler)?;
        debug!(%event, %id, once, "HubInner::register_handler: registered");
        Ok(id)
    }

    fn take_handler(&self, event: &str) -> Option<RawHandler> {
        lock(&self.handlers).take_for_invoke(event)
    }
}

/// In-process bus connecting one controller to any number of workers
///
/// Must be created from within a Tokio runtime: every endpoint runs a pump task.
#[derive(Clone)]
pub struct LocalHub {
    inner: Arc<HubInner>,
}

impl LocalHub {
    pub fn new(config: BusConfig) -> Self {
        debug!(?config, "LocalHub::new: called");
        let counters = Arc::new(Counters::default());
        let controller = Endpoint::spawn(EndpointId::controller(), config.channel_buffer, Arc::clone(&counters));
        info!("LocalHub started");
        Self {
            inner: Arc::new(HubInner {
                config,
                next_id: AtomicU64::new(0),
                worker_seq: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                controller,
                handlers: Mutex::new(HandlerTable::default()),
                workers: Mutex::new(HashMap::new()),
                counters,
            }),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// The controller's side of the bus
    pub fn controller(&self) -> ControllerPort {
        ControllerPort {
            hub: Arc::clone(&self.inner),
        }
    }

    /// Register a new worker endpoint
    ///
    /// Ids are `<name>#<n>`, unique for the lifetime of the hub.
    pub fn spawn_worker(&self, name: &str) -> Result<WorkerPort, BusError> {
        if self.inner.is_closed() {
            return Err(BusError::Closed);
        }
        let seq = self.inner.worker_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let id = EndpointId::new(format!("{}#{}", name, seq));
        let endpoint = Endpoint::spawn(id.clone(), self.inner.config.channel_buffer, Arc::clone(&self.inner.counters));
        lock(&self.inner.workers).insert(id.clone(), Arc::clone(&endpoint));
        info!(worker = %id, "Worker registered");
        Ok(WorkerPort {
            hub: Arc::clone(&self.inner),
            endpoint,
        })
    }

    /// The controller's outbound path to one worker
    pub fn link(&self, worker: &EndpointId) -> Option<LinkPort> {
        let workers = lock(&self.inner.workers);
        let endpoint = workers.get(worker)?;
        Some(LinkPort {
            hub: Arc::clone(&self.inner),
            id: worker.clone(),
            worker: Arc::downgrade(endpoint),
        })
    }

    /// Registered worker ids in sorted order
    pub fn workers(&self) -> Vec<EndpointId> {
        let mut ids: Vec<EndpointId> = lock(&self.inner.workers).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stop a worker endpoint; later sends to it fail with `EndpointGone`
    pub fn remove_worker(&self, worker: &EndpointId) -> bool {
        let removed = lock(&self.inner.workers).remove(worker);
        match removed {
            Some(endpoint) => {
                endpoint.stop();
                info!(%worker, "Worker removed");
                true
            }
            None => false,
        }
    }

    pub fn has_handler(&self, event: &str) -> bool {
        lock(&self.inner.handlers).contains(event)
    }

    pub fn metrics(&self) -> BusMetrics {
        let (registered_workers, worker_listeners) = {
            let workers = lock(&self.inner.workers);
            (workers.len(), workers.values().map(|w| w.listener_count()).sum::<usize>())
        };
        let listeners = worker_listeners + self.inner.controller.listener_count();
        let handlers = lock(&self.inner.handlers).len();
        self.inner.counters.snapshot(registered_workers, listeners, handlers)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Stop every endpoint; further sends and invokes fail
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("LocalHub shutting down");
        self.inner.controller.stop();
        for endpoint in lock(&self.inner.workers).values() {
            endpoint.stop();
        }
    }
}

/// Controller side: receives worker broadcasts and answers requests
#[derive(Clone)]
pub struct ControllerPort {
    hub: Arc<HubInner>,
}

impl ControllerPort {
    pub fn id(&self) -> &EndpointId {
        &self.hub.controller.id
    }
}

impl ListenerBus for ControllerPort {
    type Context = ControllerContext;

    fn on(&self, event: &str, listener: RawListener<ControllerContext>) -> ListenerId {
        let id = self.hub.next_listener_id();
        self.hub.controller.add_listener(event, id, false, listener);
        id
    }

    fn once(&self, event: &str, listener: RawListener<ControllerContext>) -> ListenerId {
        let id = self.hub.next_listener_id();
        self.hub.controller.add_listener(event, id, true, listener);
        id
    }

    fn remove_listener(&self, event: &str, id: ListenerId) {
        self.hub.controller.remove_listener(event, id);
    }

    fn remove_all_listeners(&self, event: &str) {
        self.hub.controller.remove_all_listeners(event);
    }
}

impl HandleBus for ControllerPort {
    fn handle(&self, event: &str, handler: RawHandler) -> Result<ListenerId, BusError> {
        self.hub.register_handler(event, handler, false)
    }

    fn handle_once(&self, event: &str, handler: RawHandler) -> Result<ListenerId, BusError> {
        self.hub.register_handler(event, handler, true)
    }

    fn remove_handler(&self, event: &str, id: ListenerId) {
        let removed = lock(&self.hub.handlers).remove(event, id);
        debug!(%event, %id, removed, "ControllerPort::remove_handler: called");
    }
}

/// Worker side: receives controller broadcasts, sends and invokes
#[derive(Clone)]
pub struct WorkerPort {
    hub: Arc<HubInner>,
    endpoint: Arc<Endpoint<WorkerContext>>,
}

impl WorkerPort {
    pub fn id(&self) -> &EndpointId {
        &self.endpoint.id
    }
}

impl ListenerBus for WorkerPort {
    type Context = WorkerContext;

    fn on(&self, event: &str, listener: RawListener<WorkerContext>) -> ListenerId {
        let id = self.hub.next_listener_id();
        self.endpoint.add_listener(event, id, false, listener);
        id
    }

    fn once(&self, event: &str, listener: RawListener<WorkerContext>) -> ListenerId {
        let id = self.hub.next_listener_id();
        self.endpoint.add_listener(event, id, true, listener);
        id
    }

    fn remove_listener(&self, event: &str, id: ListenerId) {
        self.endpoint.remove_listener(event, id);
    }

    fn remove_all_listeners(&self, event: &str) {
        self.endpoint.remove_all_listeners(event);
    }
}

impl SendBus for WorkerPort {
    fn send(&self, event: &str, args: RawArgs) -> Result<(), BusError> {
        debug!(worker = %self.endpoint.id, %event, "WorkerPort::send: called");
        if self.hub.is_closed() {
            return Err(BusError::Closed);
        }
        let reply = LinkPort {
            hub: Arc::clone(&self.hub),
            id: self.endpoint.id.clone(),
            worker: Arc::downgrade(&self.endpoint),
        };
        let context = ControllerContext {
            sender: self.endpoint.id.clone(),
            reply: Arc::new(reply),
        };
        self.hub.controller.deliver(event, context, args)?;
        Counters::bump(&self.hub.counters.messages_sent);
        Ok(())
    }
}

#[async_trait]
impl InvokeBus for WorkerPort {
    async fn invoke(&self, event: &str, args: RawArgs) -> Result<Value, BusError> {
        debug!(worker = %self.endpoint.id, %event, "WorkerPort::invoke: called");
        if self.hub.is_closed() {
            return Err(BusError::Closed);
        }
        let handler = self.hub.take_handler(event).ok_or_else(|| BusError::NoHandler {
            event: event.to_string(),
        })?;
        Counters::bump(&self.hub.counters.invocations);

        let context = InvokeContext {
            sender: self.endpoint.id.clone(),
            request_id: Uuid::now_v7(),
        };
        let request_id = context.request_id;
        let timeout = self.hub.config.invoke_timeout();

        // The handler runs on its own task so a timed-out caller does not cancel it.
        // It is called inside the task so a panic before its first await is caught too.
        let task = tokio::spawn(async move { handler(context, args).await });
        let result = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(report))) => Err(BusError::HandlerFailed(format!("{:#}", report))),
            Ok(Err(join_err)) if join_err.is_panic() => Err(BusError::HandlerFailed("handler panicked".to_string())),
            Ok(Err(_)) => Err(BusError::HandlerFailed("handler cancelled".to_string())),
            Err(_) => Err(BusError::Timeout(timeout)),
        };

        if let Err(ref err) = result {
            warn!(%event, %request_id, %err, "Invoke failed");
            Counters::bump(&self.hub.counters.invoke_failures);
        } else {
            debug!(%event, %request_id, "WorkerPort::invoke: resolved");
        }
        result
    }
}

/// Controller-to-worker delivery path for one worker
#[derive(Clone)]
pub struct LinkPort {
    hub: Arc<HubInner>,
    id: EndpointId,
    worker: Weak<Endpoint<WorkerContext>>,
}

impl LinkPort {
    pub fn id(&self) -> &EndpointId {
        &self.id
    }
}

impl SendBus for LinkPort {
    fn send(&self, event: &str, args: RawArgs) -> Result<(), BusError> {
        debug!(worker = %self.id, %event, "LinkPort::send: called");
        if self.hub.is_closed() {
            return Err(BusError::Closed);
        }
        let endpoint = self
            .worker
            .upgrade()
            .ok_or_else(|| BusError::EndpointGone(self.id.clone()))?;
        let context = WorkerContext {
            sender: EndpointId::controller(),
        };
        endpoint.deliver(event, context, args)?;
        Counters::bump(&self.hub.counters.messages_sent);
        Ok(())
    }
}
