//! Bus metrics

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Snapshot of in-process bus activity
#[derive(Debug, Clone, Default, Serialize)]
pub struct BusMetrics {
    pub registered_workers: usize,
    pub listeners: usize,
    pub handlers: usize,
    pub messages_sent: u64,
    /// Raw listener calls that returned. The bus does not see typed decoding,
    /// so a payload a typed surface drops still counts here and in its `rejected()`.
    pub messages_delivered: u64,
    pub listener_panics: u64,
    pub invocations: u64,
    pub invoke_failures: u64,
}

/// Live counters shared by the hub and its endpoint pumps
#[derive(Debug, Default)]
pub(super) struct Counters {
    pub(super) messages_sent: AtomicU64,
    pub(super) messages_delivered: AtomicU64,
    pub(super) listener_panics: AtomicU64,
    pub(super) invocations: AtomicU64,
    pub(super) invoke_failures: AtomicU64,
}

impl Counters {
    pub(super) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn snapshot(&self, registered_workers: usize, listeners: usize, handlers: usize) -> BusMetrics {
        BusMetrics {
            registered_workers,
            listeners,
            handlers,
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            listener_panics: self.listener_panics.load(Ordering::Relaxed),
            invocations: self.invocations.load(Ordering::Relaxed),
            invoke_failures: self.invoke_failures.load(Ordering::Relaxed),
        }
    }
}
