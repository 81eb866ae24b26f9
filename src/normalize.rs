//! Values produced by the face engine, and their conversion to plain JSON.
//!
//! Engines built on numeric libraries hand back fixed-width scalars and dense
//! arrays. [`normalize`] rewrites those into native numbers and lists so the
//! result can be serialized as-is.

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// A structured value returned by the face engine
#[derive(Debug, Clone, PartialEq)]
pub enum FaceValue {
    Null,
    Bool(bool),
    /// Native integer
    Int(i64),
    /// Native float
    Float(f64),
    Text(String),
    List(Vec<FaceValue>),
    Map(BTreeMap<String, FaceValue>),

    /// Library scalar wrappers
    F32(f32),
    F64(f64),
    I32(i32),
    I64(i64),

    /// A dense numeric array
    Tensor(Vec<FaceValue>),
}

/// Recursively replace library scalars and arrays with native values.
/// Normalizing a normalized value returns it unchanged.
pub fn normalize(value: FaceValue) -> FaceValue {
    match value {
        FaceValue::F32(x) => FaceValue::Float(x as f64),
        FaceValue::F64(x) => FaceValue::Float(x),
        FaceValue::I32(x) => FaceValue::Int(x as i64),
        FaceValue::I64(x) => FaceValue::Int(x),
        FaceValue::Tensor(items) | FaceValue::List(items) => {
            FaceValue::List(items.into_iter().map(normalize).collect())
        }
        FaceValue::Map(map) => {
            FaceValue::Map(map.into_iter().map(|(k, v)| (k, normalize(v))).collect())
        }
        other => other,
    }
}

impl FaceValue {
    /// True when no library scalar or array is left anywhere in the tree
    pub fn is_normalized(&self) -> bool {
        match self {
            FaceValue::F32(_)
            | FaceValue::F64(_)
            | FaceValue::I32(_)
            | FaceValue::I64(_)
            | FaceValue::Tensor(_) => false,
            FaceValue::List(items) => items.iter().all(FaceValue::is_normalized),
            FaceValue::Map(map) => map.values().all(FaceValue::is_normalized),
            _ => true,
        }
    }
}

fn float_value(x: f64) -> Value {
    // JSON has no NaN or infinity
    Number::from_f64(x).map(Value::Number).unwrap_or(Value::Null)
}

impl From<FaceValue> for Value {
    fn from(value: FaceValue) -> Value {
        match normalize(value) {
            FaceValue::Null => Value::Null,
            FaceValue::Bool(b) => Value::Bool(b),
            FaceValue::Int(i) => Value::Number(i.into()),
            FaceValue::Float(x) => float_value(x),
            FaceValue::Text(s) => Value::String(s),
            FaceValue::List(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            FaceValue::Map(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect::<Map<String, Value>>(),
            ),
            // normalize() leaves none of these behind
            FaceValue::F32(_)
            | FaceValue::F64(_)
            | FaceValue::I32(_)
            | FaceValue::I64(_)
            | FaceValue::Tensor(_) => Value::Null,
        }
    }
}

impl From<Value> for FaceValue {
    fn from(value: Value) -> FaceValue {
        match value {
            Value::Null => FaceValue::Null,
            Value::Bool(b) => FaceValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FaceValue::Int(i),
                None => FaceValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => FaceValue::Text(s),
            Value::Array(items) => FaceValue::List(items.into_iter().map(FaceValue::from).collect()),
            Value::Object(map) => {
                FaceValue::Map(map.into_iter().map(|(k, v)| (k, FaceValue::from(v))).collect())
            }
        }
    }
}

impl Serialize for FaceValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            FaceValue::Null => serializer.serialize_unit(),
            FaceValue::Bool(b) => serializer.serialize_bool(*b),
            FaceValue::Int(i) | FaceValue::I64(i) => serializer.serialize_i64(*i),
            FaceValue::I32(i) => serializer.serialize_i64(*i as i64),
            FaceValue::Float(x) | FaceValue::F64(x) => float_value(*x).serialize(serializer),
            FaceValue::F32(x) => float_value(*x as f64).serialize(serializer),
            FaceValue::Text(s) => serializer.serialize_str(s),
            FaceValue::List(items) | FaceValue::Tensor(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            FaceValue::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
        }
    }
}
