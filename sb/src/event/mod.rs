//! Event-map model
//!
//! An event is a zero-sized marker type carrying its bus name and its handler
//! shape. An event map is a marker type listing its events; `Has<E>` is the
//! membership relation the typed surfaces bound on, so an event outside the map
//! does not compile.
//!
//! # Declaring events
//!
//! ```
//! use strictbus::schema::Param;
//! use strictbus::{Event, HandlerShape, Payload, Request, define_event, define_request, event_map};
//!
//! define_event!(pub Ready = "ready": fn(String));
//! define_event!(pub Progress = "progress": Payload<u32>);
//! define_request!(pub Add = "add": fn(i64, i64) -> i64);
//!
//! event_map!(pub ToController { Ready, Progress });
//! event_map!(pub Requests { Add });
//!
//! // Or declare the events inline
//! event_map!(pub ToWorker {
//!     Start = "start": fn(String, u32),
//!     Halt = "halt": Payload<String>,
//! });
//!
//! fn main() {
//!     assert_eq!(Ready::NAME, "ready");
//!     assert_eq!(Progress::shape(), HandlerShape::new(vec![u32::param_type()]));
//!     assert_eq!(Halt::shape(), HandlerShape::new(vec![String::param_type()]));
//!     let sum: <Add as Request>::Output = 5;
//!     assert_eq!(sum, 5i64);
//! }
//! ```

mod args;
mod funcify;
mod macros;

pub use args::{Args, Shape};
pub use funcify::{Funcified, Funcify, Payload};

use crate::bus::RawArgs;
use crate::error::ContractError;
use crate::schema::{HandlerShape, Param, SchemaBuilder};

/// A named event with a fixed handler shape
pub trait Event: Send + Sync + 'static {
    /// Name the event travels under on the bus
    const NAME: &'static str;

    type Shape: Shape;

    /// Runtime descriptor of this event's shape
    fn shape() -> HandlerShape {
        HandlerShape::new(<ArgsOf<Self> as Args>::params())
    }
}

/// Argument tuple declared for an event
pub type ArgsOf<E> = <<E as Event>::Shape as Shape>::Args;

/// An event answered by exactly one handler, resolving `invoke` with `Output`
pub trait Request: Event {
    type Output: Param;
}

/// A declared set of events
pub trait EventMap: Send + Sync + 'static {
    const NAME: &'static str;

    /// Add every member event to a schema builder
    fn describe(builder: &mut SchemaBuilder);
}

/// Membership of `E` in an event map
pub trait Has<E: Event>: EventMap {}

/// Encode typed arguments for `E`
pub(crate) fn encode<E: Event>(args: ArgsOf<E>) -> Result<RawArgs, ContractError> {
    args.encode().map_err(|source| ContractError::Encode {
        event: E::NAME.to_string(),
        source,
    })
}
