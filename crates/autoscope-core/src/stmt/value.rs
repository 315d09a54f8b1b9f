use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;

/// A single stored or queried value.
///
/// Rows, predicate arguments, and sidecar payloads all move through this
/// type. Integral JSON numbers decode as `I64`, all other numbers as `F64`;
/// arrays and objects stay as raw JSON.
#[derive(Debug, Default, Clone, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Json(serde_json::Value),
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I64(v) => Some(*v),
            Self::F64(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// The value-type bucket used by the statistics histograms.
    pub fn value_type(&self) -> &'static str {
        match self {
            Self::I64(_) => "int",
            Self::F64(_) => "float",
            Self::String(_) => "string",
            _ => "unknown",
        }
    }

    /// Loose comparison used by the in-memory backend: numbers compare
    /// across `I64`/`F64`, strings compare lexicographically, everything
    /// else is incomparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::I64(a), Self::I64(b)) => Some(a.cmp(b)),
            (Self::I64(a), Self::F64(b)) => (*a as f64).partial_cmp(b),
            (Self::F64(a), Self::I64(b)) => a.partial_cmp(&(*b as f64)),
            (Self::F64(a), Self::F64(b)) => a.partial_cmp(b),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::I64(i)
                } else {
                    Self::F64(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Self::String(s),
            other => Self::Json(other),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::I64(v) => serde_json::Value::from(*v),
            Self::F64(v) => serde_json::Value::from(*v),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Json(v) => v.clone(),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::I64(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::I64(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::F64(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_json(serde_json::Value::deserialize(
            deserializer,
        )?))
    }
}
