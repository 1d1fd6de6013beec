//! Handler shapes and payload normalization

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::param::{ParamType, describe};

/// Ordered, fixed-arity parameter list of one event
///
/// `returns` is only set for request events, where it describes the value the
/// handler resolves an `invoke` with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerShape {
    pub params: Vec<ParamType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<ParamType>,
}

impl HandlerShape {
    pub fn new(params: Vec<ParamType>) -> Self {
        Self { params, returns: None }
    }

    pub fn with_returns(mut self, returns: ParamType) -> Self {
        self.returns = Some(returns);
        self
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Shapes are compatible only when their parameter lists are identical
    pub fn is_compatible(&self, other: &HandlerShape) -> bool {
        self.params == other.params
    }

    /// Check raw arguments against this shape
    ///
    /// Returns a human-readable description of the first mismatch.
    pub fn check_args(&self, args: &[Value]) -> Result<(), String> {
        if args.len() != self.params.len() {
            return Err(format!(
                "expected {} argument(s), got {}",
                self.params.len(),
                args.len()
            ));
        }

        for (index, (param, value)) in self.params.iter().zip(args).enumerate() {
            if !param.accepts(value) {
                return Err(format!(
                    "argument {}: expected {}, got {}",
                    index,
                    param,
                    describe(value)
                ));
            }
        }
        Ok(())
    }

    /// Check a handler result against the declared return type
    pub fn check_return(&self, value: &Value) -> Result<(), String> {
        match &self.returns {
            Some(returns) if !returns.accepts(value) => {
                Err(format!("result: expected {}, got {}", returns, describe(value)))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for HandlerShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
        write!(f, "({})", params.join(", "))?;
        if let Some(returns) = &self.returns {
            write!(f, " -> {}", returns)?;
        }
        Ok(())
    }
}

/// A map entry as declared at runtime: either a plain payload or a handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RawShape {
    Value(ParamType),
    Handler(HandlerShape),
}

impl RawShape {
    /// Normalize into a handler shape; plain payloads become `(value)`
    pub fn funcify(self) -> HandlerShape {
        match self {
            Self::Value(param) => HandlerShape::new(vec![param]),
            Self::Handler(shape) => shape,
        }
    }
}

impl From<HandlerShape> for RawShape {
    fn from(shape: HandlerShape) -> Self {
        Self::Handler(shape)
    }
}

impl From<ParamType> for RawShape {
    fn from(param: ParamType) -> Self {
        Self::Value(param)
    }
}

/// Normalize a whole runtime map of payload and handler declarations
pub fn funcify(raw: BTreeMap<String, RawShape>) -> BTreeMap<String, HandlerShape> {
    raw.into_iter().map(|(name, shape)| (name, shape.funcify())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_check_args_arity() {
        let shape = HandlerShape::new(vec![ParamType::Integer, ParamType::String]);
        let err = shape.check_args(&[json!(1)]).unwrap_err();
        assert_eq!(err, "expected 2 argument(s), got 1");
    }

    #[test]
    fn test_check_args_type() {
        let shape = HandlerShape::new(vec![ParamType::Integer, ParamType::String]);
        assert!(shape.check_args(&[json!(1), json!("x")]).is_ok());

        let err = shape.check_args(&[json!(1), json!(2)]).unwrap_err();
        assert_eq!(err, "argument 1: expected string, got integer");
    }

    #[test]
    fn test_check_return() {
        let shape = HandlerShape::new(vec![]).with_returns(ParamType::Bool);
        assert!(shape.check_return(&json!(true)).is_ok());
        assert!(shape.check_return(&json!("yes")).is_err());

        // No declared return accepts anything
        assert!(HandlerShape::new(vec![]).check_return(&json!("yes")).is_ok());
    }

    #[test]
    fn test_compatibility_is_order_sensitive() {
        let a = HandlerShape::new(vec![ParamType::Integer, ParamType::String]);
        let b = HandlerShape::new(vec![ParamType::String, ParamType::Integer]);
        let c = HandlerShape::new(vec![ParamType::Integer, ParamType::String]).with_returns(ParamType::Null);
        assert!(!a.is_compatible(&b));
        assert!(a.is_compatible(&c));
    }

    #[test]
    fn test_funcify_wraps_values_and_keeps_handlers() {
        let mut raw = BTreeMap::new();
        raw.insert("a".to_string(), RawShape::Value(ParamType::Number));
        raw.insert(
            "b".to_string(),
            RawShape::Handler(HandlerShape::new(vec![ParamType::String])),
        );

        let normalized = funcify(raw);
        assert_eq!(normalized["a"], HandlerShape::new(vec![ParamType::Number]));
        assert_eq!(normalized["b"], HandlerShape::new(vec![ParamType::String]));
    }

    #[test]
    fn test_funcify_is_idempotent() {
        let mut raw = BTreeMap::new();
        raw.insert("a".to_string(), RawShape::Value(ParamType::Integer));

        let once = funcify(raw);
        let twice = funcify(once.clone().into_iter().map(|(k, v)| (k, RawShape::from(v))).collect());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_display() {
        let shape = HandlerShape::new(vec![ParamType::Integer, ParamType::Integer]).with_returns(ParamType::Integer);
        assert_eq!(shape.to_string(), "(integer, integer) -> integer");
    }
}
