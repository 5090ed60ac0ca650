//! Dynamic feature values.

use uuid::Uuid;

use crate::error::ListError;

/// Handle of an object inside a [`Resource`](crate::model::Resource).
///
/// Handles are only meaningful for the resource that issued them; the stable,
/// resource-independent identity of an object is its UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) u32);

impl ObjectId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// A value held by an object feature, list element or map entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    /// Reference to an object of the same resource.
    Object(ObjectId),
    /// Placeholder for an object that has not been materialised yet.
    ///
    /// Decoders produce proxies for forward references and replace them before
    /// returning; a finished graph contains none.
    Proxy(Uuid),
}

impl Value {
    /// Short name of the value's variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Object(_) => "object",
            Value::Proxy(_) => "proxy",
        }
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self, Value::Proxy(_))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<ObjectId> for Value {
    fn from(v: ObjectId) -> Self {
        Value::Object(v)
    }
}

macro_rules! impl_try_from_value {
    ($ty:ty, $variant:ident, $name:literal) => {
        impl TryFrom<Value> for $ty {
            type Error = ListError;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                match value {
                    Value::$variant(v) => Ok(v),
                    other => Err(ListError::TypeMismatch {
                        expected: $name,
                        found: other.kind_name(),
                    }),
                }
            }
        }
    };
}

impl_try_from_value!(bool, Bool, "bool");
impl_try_from_value!(i64, Int, "int");
impl_try_from_value!(f64, Float, "float");
impl_try_from_value!(String, String, "string");
impl_try_from_value!(Vec<u8>, Bytes, "bytes");
impl_try_from_value!(ObjectId, Object, "object");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(Value::from(3), Value::Int(3));
        assert_eq!(Value::from("a"), Value::String("a".to_string()));
        assert_eq!(i64::try_from(Value::Int(4)), Ok(4));
        assert_eq!(
            String::try_from(Value::Int(4)),
            Err(ListError::TypeMismatch {
                expected: "string",
                found: "int"
            })
        );
    }

    #[test]
    fn test_accessors() {
        let id = ObjectId(5);
        assert_eq!(Value::from(id).as_object(), Some(id));
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert!(Value::Proxy(Uuid::nil()).is_proxy());
        assert_eq!(Value::Bytes(vec![1]).kind_name(), "bytes");
    }
}
