//! Parameter descriptors
//!
//! Every argument an event carries has a runtime descriptor so that the dynamic
//! paths can check raw JSON arguments before they reach the bus. A descriptor
//! accepts exactly the values the typed side would decode: integer widths keep
//! their range and records list their fields.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structural type of a single event parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "of", rename_all = "kebab-case")]
pub enum ParamType {
    Null,
    Bool,
    /// Any value in the `i64` range
    Integer,
    /// An integer within `min..=max`
    Bounded { min: i64, max: u64 },
    Number,
    String,
    Array(Box<ParamType>),
    Optional(Box<ParamType>),
    Map(Box<ParamType>),
    /// A named record with the fields it must carry
    Object { name: String, fields: Vec<FieldType> },
    Any,
}

/// One field of an [`ParamType::Object`] record, by its serialized name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldType {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParamType,
}

impl FieldType {
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self { name: name.into(), ty }
    }
}

impl ParamType {
    /// Integer descriptor for `min..=max`; the full `i64` range is plain `Integer`
    pub fn int_range(min: i64, max: u64) -> Self {
        if min == i64::MIN && max == i64::MAX as u64 {
            Self::Integer
        } else {
            Self::Bounded { min, max }
        }
    }

    /// Check whether a JSON value structurally matches this descriptor
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Null => value.is_null(),
            Self::Bool => value.is_boolean(),
            Self::Integer => value.is_i64(),
            Self::Bounded { min, max } => match value.as_i64() {
                Some(n) => n >= *min && (n < 0 || n as u64 <= *max),
                None => value.as_u64().is_some_and(|n| n <= *max),
            },
            Self::Number => value.is_number(),
            Self::String => value.is_string(),
            Self::Array(inner) => value
                .as_array()
                .is_some_and(|items| items.iter().all(|item| inner.accepts(item))),
            Self::Optional(inner) => value.is_null() || inner.accepts(value),
            Self::Map(inner) => value
                .as_object()
                .is_some_and(|entries| entries.values().all(|item| inner.accepts(item))),
            // Missing optional fields decode as `None`; unknown fields are ignored
            Self::Object { fields, .. } => value.as_object().is_some_and(|entries| {
                fields.iter().all(|field| match entries.get(&field.name) {
                    Some(item) => field.ty.accepts(item),
                    None => matches!(field.ty, Self::Optional(_)),
                })
            }),
            Self::Any => true,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool => write!(f, "bool"),
            Self::Integer => write!(f, "integer"),
            Self::Bounded { min, max } => write!(f, "integer[{}..={}]", min, max),
            Self::Number => write!(f, "number"),
            Self::String => write!(f, "string"),
            Self::Array(inner) => write!(f, "[{}]", inner),
            Self::Optional(inner) => write!(f, "{}?", inner),
            Self::Map(inner) => write!(f, "{{string: {}}}", inner),
            Self::Object { name, .. } => write!(f, "{}", name),
            Self::Any => write!(f, "any"),
        }
    }
}

/// Short description of a JSON value's kind, used in mismatch messages
pub(crate) fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A type that may appear as an event parameter or a request result
///
/// Implemented for the common std types. Records implement it through
/// [`object_param!`](crate::object_param).
pub trait Param: Serialize + DeserializeOwned + Send + 'static {
    fn param_type() -> ParamType;
}

macro_rules! impl_param {
    ($kind:ident: $($ty:ty),+) => {
        $(
            impl Param for $ty {
                fn param_type() -> ParamType {
                    ParamType::$kind
                }
            }
        )+
    };
}

macro_rules! impl_param_int {
    ($($ty:ty),+) => {
        $(
            impl Param for $ty {
                fn param_type() -> ParamType {
                    ParamType::int_range(<$ty>::MIN as i64, <$ty>::MAX as u64)
                }
            }
        )+
    };
}

impl_param_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
impl_param!(Number: f32, f64);
impl_param!(Bool: bool);
impl_param!(String: String);
impl_param!(Null: ());
impl_param!(Any: Value);

impl<T: Param> Param for Vec<T> {
    fn param_type() -> ParamType {
        ParamType::Array(Box::new(T::param_type()))
    }
}

impl<T: Param> Param for Option<T> {
    fn param_type() -> ParamType {
        ParamType::Optional(Box::new(T::param_type()))
    }
}

impl<T: Param> Param for HashMap<String, T> {
    fn param_type() -> ParamType {
        ParamType::Map(Box::new(T::param_type()))
    }
}

impl<T: Param> Param for BTreeMap<String, T> {
    fn param_type() -> ParamType {
        ParamType::Map(Box::new(T::param_type()))
    }
}

/// Implement [`Param`] for a serde record type
///
/// List the fields under their serialized names, with their types.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use strictbus::schema::{Param, ParamType};
/// use serde_json::json;
///
/// #[derive(Serialize, Deserialize)]
/// struct Progress {
///     done: u32,
///     total: u32,
///     note: Option<String>,
/// }
/// strictbus::object_param!(Progress { done: u32, total: u32, note: Option<String> });
///
/// let ty = Progress::param_type();
/// assert!(ty.accepts(&json!({"done": 1, "total": 4})));
/// assert!(!ty.accepts(&json!({"done": 1})));
/// assert!(!ty.accepts(&json!({"done": -1, "total": 4})));
/// assert!(matches!(ty, ParamType::Object { .. }));
/// ```
#[macro_export]
macro_rules! object_param {
    ($ty:ident { $($field:ident : $fty:ty),* $(,)? }) => {
        impl $crate::schema::Param for $ty {
            fn param_type() -> $crate::schema::ParamType {
                $crate::schema::ParamType::Object {
                    name: stringify!($ty).to_string(),
                    fields: vec![
                        $(
                            $crate::schema::FieldType::new(
                                stringify!($field),
                                <$fty as $crate::schema::Param>::param_type(),
                            )
                        ),*
                    ],
                }
            }
        }
    };
}
