//! Listener and handler tables for the in-process bus

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::bus::{BusError, ListenerId, RawHandler, RawListener};

/// Lock a table, recovering the data if a listener panicked while it was held
pub(super) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ListenerSlot<C> {
    id: ListenerId,
    once: bool,
    listener: RawListener<C>,
}

/// Listeners of one endpoint, keyed by event name in registration order
pub(super) struct ListenerTable<C> {
    slots: HashMap<String, Vec<ListenerSlot<C>>>,
}

impl<C> Default for ListenerTable<C> {
    fn default() -> Self {
        Self { slots: HashMap::new() }
    }
}

impl<C> ListenerTable<C> {
    pub(super) fn add(&mut self, event: &str, id: ListenerId, once: bool, listener: RawListener<C>) {
        self.slots
            .entry(event.to_string())
            .or_default()
            .push(ListenerSlot { id, once, listener });
    }

    pub(super) fn remove(&mut self, event: &str, id: ListenerId) -> bool {
        let Some(slots) = self.slots.get_mut(event) else {
            return false;
        };
        let before = slots.len();
        slots.retain(|slot| slot.id != id);
        let removed = slots.len() != before;
        if slots.is_empty() {
            self.slots.remove(event);
        }
        removed
    }

    pub(super) fn clear(&mut self, event: &str) -> usize {
        self.slots.remove(event).map(|slots| slots.len()).unwrap_or(0)
    }

    /// Listeners to call for one delivery; `once` slots are dropped here, under the lock
    pub(super) fn take_for_dispatch(&mut self, event: &str) -> Vec<RawListener<C>> {
        let Some(slots) = self.slots.get_mut(event) else {
            return Vec::new();
        };
        let listeners = slots.iter().map(|slot| slot.listener.clone()).collect();
        slots.retain(|slot| !slot.once);
        if slots.is_empty() {
            self.slots.remove(event);
        }
        listeners
    }

    #[cfg(test)]
    pub(super) fn count(&self, event: &str) -> usize {
        self.slots.get(event).map(Vec::len).unwrap_or(0)
    }

    pub(super) fn len(&self) -> usize {
        self.slots.values().map(Vec::len).sum()
    }
}

struct HandlerSlot {
    id: ListenerId,
    once: bool,
    handler: RawHandler,
}

/// At most one handler per event name
#[derive(Default)]
pub(super) struct HandlerTable {
    slots: HashMap<String, HandlerSlot>,
}

impl HandlerTable {
    pub(super) fn insert(
        &mut self,
        event: &str,
        id: ListenerId,
        once: bool,
        handler: RawHandler,
    ) -> Result<(), BusError> {
        if self.slots.contains_key(event) {
            return Err(BusError::HandlerExists {
                event: event.to_string(),
            });
        }
        self.slots.insert(event.to_string(), HandlerSlot { id, once, handler });
        Ok(())
    }

    /// Remove the handler for `event` only if it is the one `id` names
    pub(super) fn remove(&mut self, event: &str, id: ListenerId) -> bool {
        match self.slots.get(event) {
            Some(slot) if slot.id == id => {
                self.slots.remove(event);
                true
            }
            _ => false,
        }
    }

    /// Handler to answer one request; a `once` handler leaves the table here
    pub(super) fn take_for_invoke(&mut self, event: &str) -> Option<RawHandler> {
        let once = self.slots.get(event)?.once;
        if once {
            self.slots.remove(event).map(|slot| slot.handler)
        } else {
            self.slots.get(event).map(|slot| slot.handler.clone())
        }
    }

    pub(super) fn contains(&self, event: &str) -> bool {
        self.slots.contains_key(event)
    }

    pub(super) fn len(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{InvokeContext, RawArgs};
    use futures::future::BoxFuture;
    use serde_json::Value;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_listener(counter: Arc<AtomicUsize>) -> RawListener<()> {
        Arc::new(move |_: (), _: RawArgs| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn noop_handler() -> RawHandler {
        Arc::new(|_: InvokeContext, _: RawArgs| -> BoxFuture<'static, eyre::Result<Value>> {
            Box::pin(async { Ok(Value::Null) })
        })
    }

    #[test]
    fn test_once_slot_dropped_on_dispatch() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut table = ListenerTable::default();
        table.add("tick", ListenerId::from_raw(1), true, counting_listener(counter.clone()));
        table.add("tick", ListenerId::from_raw(2), false, counting_listener(counter.clone()));

        assert_eq!(table.take_for_dispatch("tick").len(), 2);
        assert_eq!(table.count("tick"), 1);
        assert_eq!(table.take_for_dispatch("tick").len(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut table = ListenerTable::default();
        table.add("tick", ListenerId::from_raw(1), false, counting_listener(counter));

        assert!(table.remove("tick", ListenerId::from_raw(1)));
        assert!(!table.remove("tick", ListenerId::from_raw(1)));
        assert!(!table.remove("other", ListenerId::from_raw(1)));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_clear() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut table = ListenerTable::default();
        table.add("tick", ListenerId::from_raw(1), false, counting_listener(counter.clone()));
        table.add("tick", ListenerId::from_raw(2), true, counting_listener(counter.clone()));
        table.add("tock", ListenerId::from_raw(3), false, counting_listener(counter));

        assert_eq!(table.clear("tick"), 2);
        assert_eq!(table.clear("tick"), 0);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_handler_conflict() {
        let mut table = HandlerTable::default();
        table
            .insert("ping", ListenerId::from_raw(1), false, noop_handler())
            .unwrap();

        let err = table
            .insert("ping", ListenerId::from_raw(2), false, noop_handler())
            .unwrap_err();
        assert_eq!(
            err,
            BusError::HandlerExists {
                event: "ping".to_string()
            }
        );
    }

    #[test]
    fn test_handler_remove_requires_matching_id() {
        let mut table = HandlerTable::default();
        table
            .insert("ping", ListenerId::from_raw(1), false, noop_handler())
            .unwrap();

        assert!(!table.remove("ping", ListenerId::from_raw(9)));
        assert!(table.contains("ping"));
        assert!(table.remove("ping", ListenerId::from_raw(1)));
        assert!(!table.remove("ping", ListenerId::from_raw(1)));
    }

    #[test]
    fn test_once_handler_taken() {
        let mut table = HandlerTable::default();
        table
            .insert("ping", ListenerId::from_raw(1), true, noop_handler())
            .unwrap();

        assert!(table.take_for_invoke("ping").is_some());
        assert!(table.take_for_invoke("ping").is_none());
        assert_eq!(table.len(), 0);
    }
}
