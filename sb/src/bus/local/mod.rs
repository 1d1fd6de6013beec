//! In-process bus
//!
//! [`LocalHub`] owns one controller endpoint and any number of worker
//! endpoints. Each endpoint drains its own queue on a Tokio task, so
//! broadcasts arrive in send order and listeners never run on the sender's
//! stack. Requests go straight to the single registered handler.

mod hub;
mod metrics;
mod registry;

pub use hub::{ControllerPort, LinkPort, LocalHub, WorkerPort};
pub use metrics::BusMetrics;
