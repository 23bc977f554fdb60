//! Typed attribute values
//!
//! Attribute slots are typed at construction; writes arrive as raw JSON and
//! are checked (and minimally coerced) against the declared type.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Declared type of an attribute slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Boolean
    Bool,
    /// Signed integer
    Int,
    /// Floating point number
    Float,
    /// UTF-8 string
    String,
    /// Arbitrary JSON document
    Json,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::String => write!(f, "string"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// A typed value held by an attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypedValue {
    /// No value written yet
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
    /// String value
    Str(String),
    /// JSON document value
    Json(Value),
}

impl TypedValue {
    /// Check `raw` against the declared type, coercing where safe.
    ///
    /// The only implicit coercion is JSON integer input into a `Float` slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] when the JSON value does not fit the
    /// declared type.
    pub fn from_json(ty: ValueType, raw: Value) -> Result<Self> {
        let mismatch = |raw: &Value| {
            Error::InvalidValue(format!("expected {ty}, got {}", json_type_name(raw)))
        };
        match ty {
            ValueType::Bool => raw.as_bool().map(Self::Bool).ok_or_else(|| mismatch(&raw)),
            ValueType::Int => raw.as_i64().map(Self::Int).ok_or_else(|| mismatch(&raw)),
            ValueType::Float => raw.as_f64().map(Self::Float).ok_or_else(|| mismatch(&raw)),
            ValueType::String => match raw {
                Value::String(s) => Ok(Self::Str(s)),
                other => Err(mismatch(&other)),
            },
            ValueType::Json => Ok(Self::Json(raw)),
        }
    }

    /// JSON rendering of the value
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::from(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => Value::from(*f),
            Self::Str(s) => Value::from(s.clone()),
            Self::Json(v) => v.clone(),
        }
    }

    /// Numeric view, if the value is numeric
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
