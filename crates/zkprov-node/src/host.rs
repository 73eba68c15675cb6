//! Untyped values as a dynamically-typed host hands them over.

use serde_json::Value;
use zkprov_core::{parse_call_config, CallConfig, ErrorValue};
use zkprov_ffi::HostBuffer;

/// A host argument before validation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HostValue {
    /// Argument not supplied.
    #[default]
    Undefined,
    /// Plain data (objects, arrays, strings, numbers, booleans, null).
    Json(Value),
    /// A byte buffer.
    Buffer(HostBuffer),
    /// Something with no data representation (functions, symbols, …),
    /// labelled with its type name.
    Opaque(&'static str),
}

impl HostValue {
    /// Whether the argument was supplied at all.
    #[must_use]
    pub const fn is_defined(&self) -> bool {
        !matches!(self, Self::Undefined)
    }

    /// Validate as a call configuration.
    ///
    /// A buffer is an object with none of the config properties, so it fails
    /// on the first required key rather than on its type.
    pub fn to_call_config(&self) -> Result<CallConfig, ErrorValue> {
        let parsed = match self {
            Self::Json(v) => parse_call_config(v),
            Self::Buffer(_) => parse_call_config(&Value::Object(serde_json::Map::new())),
            Self::Undefined | Self::Opaque(_) => parse_call_config(&Value::Null),
        };
        parsed.map_err(ErrorValue::from)
    }

    /// The bytes, if this is a buffer.
    #[must_use]
    pub const fn as_buffer(&self) -> Option<&HostBuffer> {
        match self {
            Self::Buffer(b) => Some(b),
            _ => None,
        }
    }
}

impl From<Value> for HostValue {
    fn from(v: Value) -> Self {
        Self::Json(v)
    }
}

impl From<HostBuffer> for HostValue {
    fn from(b: HostBuffer) -> Self {
        Self::Buffer(b)
    }
}

impl From<Vec<u8>> for HostValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Buffer(v.into())
    }
}

impl From<&[u8]> for HostValue {
    fn from(v: &[u8]) -> Self {
        Self::Buffer(v.into())
    }
}

impl<T: Into<Self>> From<Option<T>> for HostValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Undefined, Into::into)
    }
}
