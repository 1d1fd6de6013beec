//! Argument tuples and handler shapes
//!
//! An event's parameters are a tuple. `Shape` maps a function pointer type
//! such as `fn(String, u32)` onto its argument tuple `(String, u32)`.

use tracing::debug;

use crate::bus::RawArgs;
use crate::error::ShapeError;
use crate::schema::{Param, ParamType};

/// An ordered, fixed-arity argument list
pub trait Args: Sized + Send + 'static {
    /// Parameter descriptors in declaration order
    fn params() -> Vec<ParamType>;

    /// Encode into the bus's untyped argument list
    fn encode(self) -> Result<RawArgs, serde_json::Error>;

    /// Decode an untyped argument list, checking arity and every parameter
    fn decode(raw: RawArgs) -> Result<Self, ShapeError>;
}

/// A handler-shaped type: accepts `Self::Args` and returns nothing
pub trait Shape: 'static {
    type Args: Args;
}

macro_rules! impl_args {
    ($len:expr; $($name:ident),*) => {
        impl<$($name: Param),*> Args for ($($name,)*) {
            fn params() -> Vec<ParamType> {
                vec![$($name::param_type()),*]
            }

            #[allow(non_snake_case)]
            fn encode(self) -> Result<RawArgs, serde_json::Error> {
                let ($($name,)*) = self;
                Ok(vec![$(serde_json::to_value($name)?),*])
            }

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn decode(raw: RawArgs) -> Result<Self, ShapeError> {
                let found = raw.len();
                if found != $len {
                    debug!(expected = $len, found, "Args::decode: arity mismatch");
                    return Err(ShapeError::Arity { expected: $len, found });
                }
                let mut values = raw.into_iter().enumerate();
                $(
                    let $name = {
                        let (index, value) = values.next().ok_or(ShapeError::Arity { expected: $len, found })?;
                        serde_json::from_value::<$name>(value).map_err(|source| ShapeError::Param { index, source })?
                    };
                )*
                Ok(($($name,)*))
            }
        }

        impl<$($name: Param),*> Shape for fn($($name),*) {
            type Args = ($($name,)*);
        }
    };
}

impl_args!(0;);
impl_args!(1; A);
impl_args!(2; A, B);
impl_args!(3; A, B, C);
impl_args!(4; A, B, C, D);
impl_args!(5; A, B, C, D, E);
impl_args!(6; A, B, C, D, E, F);
