//! Type-level payload normalization
//!
//! Lets a map declare `Payload<T>` for the simple "event carries one value"
//! case and still be handler-shaped everywhere else. Handler shapes pass
//! through untouched, so normalizing twice is the same as normalizing once.

use std::fmt;
use std::marker::PhantomData;

use super::args::Shape;
use crate::schema::Param;

/// A plain payload declaration, normalized to `fn(T)`
pub struct Payload<T>(PhantomData<fn() -> T>);

impl<T> fmt::Debug for Payload<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload<{}>", std::any::type_name::<T>())
    }
}

/// Normalize a declaration into a handler shape
pub trait Funcify {
    type Output: Shape;
}

/// Result of normalizing `S`
pub type Funcified<S> = <S as Funcify>::Output;

impl<T: Param> Funcify for Payload<T> {
    type Output = fn(T);
}

macro_rules! impl_funcify {
    ($($name:ident),*) => {
        impl<$($name: Param),*> Funcify for fn($($name),*) {
            type Output = Self;
        }
    };
}

impl_funcify!();
impl_funcify!(A);
impl_funcify!(A, B);
impl_funcify!(A, B, C);
impl_funcify!(A, B, C, D);
impl_funcify!(A, B, C, D, E);
impl_funcify!(A, B, C, D, E, F);
