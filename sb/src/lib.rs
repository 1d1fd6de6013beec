//! strictbus - typed contracts over an untyped controller/worker event bus
//!
//! Declare the events each side of a channel may receive and send as event
//! maps, build a [`Contract`] from them, and wrap raw bus handles in typed
//! surfaces. Unknown events and mismatched arguments fail to compile; names
//! only known at runtime are checked against the map's [`Schema`].
//!
//! ```
//! use strictbus::{BusConfig, Contract, LocalHub, event_map};
//! use tokio::sync::mpsc;
//!
//! event_map!(pub ToController { Ready = "ready": fn(String) });
//! event_map!(pub ToWorker { Start = "start": fn(String, u32) });
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = LocalHub::new(BusConfig::default());
//!     let contract = Contract::<ToController, ToWorker>::new()?;
//!
//!     let controller = contract.controller(hub.controller());
//!     controller.on::<Ready, _>(|event, (name,)| {
//!         let _ = event.reply::<Start>((name, 3));
//!     });
//!
//!     let worker = contract.reversed().worker(hub.spawn_worker("render")?);
//!     let (tx, mut rx) = mpsc::unbounded_channel();
//!     worker.on::<Start, _>(move |_, (name, count)| {
//!         let _ = tx.send(format!("{} x{}", name, count));
//!     });
//!     worker.send::<Ready>(("alpha".to_string(),))?;
//!
//!     assert_eq!(rx.recv().await.as_deref(), Some("alpha x3"));
//!     Ok(())
//! }
//! ```

pub mod bus;
pub mod config;
pub mod contract;
pub mod error;
pub mod event;
pub mod logging;
pub mod schema;

pub use bus::local::{BusMetrics, ControllerPort, LinkPort, LocalHub, WorkerPort};
pub use bus::{BusConfig, BusError, EndpointId, ListenerId};
pub use config::Config;
pub use contract::{
    Contract, ControllerEvent, DynamicKey, Evented, HandlerKey, InvokeEvent, ListenerKey, StrictController,
    StrictHandler, StrictInvoker, StrictWorker, WorkerEvent, WorkerLink,
};
pub use error::{ContractError, ShapeError};
pub use event::{Args, ArgsOf, Event, EventMap, Funcified, Funcify, Has, Payload, Request};
pub use schema::{FieldType, HandlerShape, Param, ParamType, RawShape, Schema, SchemaBuilder, funcify};
