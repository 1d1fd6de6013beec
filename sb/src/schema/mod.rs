//! Runtime schema tables
//!
//! The typed surfaces get their guarantees from the compiler. The dynamic
//! surfaces (`*_dynamic` methods) and inbound decoding lean on these tables:
//! event name to [`HandlerShape`], built once per event map.

mod param;
mod shape;
mod table;

pub use param::{FieldType, Param, ParamType};
pub use shape::{HandlerShape, RawShape, funcify};
pub use table::{Schema, SchemaBuilder};
