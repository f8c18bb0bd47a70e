//! Typed property values

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One structured entry of a delimited list property
pub type Record = BTreeMap<String, String>;

/// Decoded properties keyed by property name
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// A decoded property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    /// Member of a closed set, always uppercase after decoding
    Enum(String),
    Text(String),
    Json(serde_json::Value),
    Records(Vec<Record>),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) | PropertyValue::Enum(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            PropertyValue::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_records(&self) -> Option<&[Record]> {
        match self {
            PropertyValue::Records(r) => Some(r),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Int(_) => "int",
            PropertyValue::Enum(_) => "enum",
            PropertyValue::Text(_) => "text",
            PropertyValue::Json(_) => "json",
            PropertyValue::Records(_) => "records",
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Int(i) => write!(f, "{}", i),
            PropertyValue::Enum(s) | PropertyValue::Text(s) => f.write_str(s),
            PropertyValue::Json(v) => write!(f, "{}", v),
            PropertyValue::Records(records) => {
                for (i, record) in records.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    let fields: Vec<String> =
                        record.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                    f.write_str(&fields.join(", "))?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        PropertyValue::Int(i)
    }
}

impl From<i32> for PropertyValue {
    fn from(i: i32) -> Self {
        PropertyValue::Int(i as i64)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Text(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Text(s)
    }
}

impl From<serde_json::Value> for PropertyValue {
    fn from(v: serde_json::Value) -> Self {
        PropertyValue::Json(v)
    }
}

impl From<Vec<Record>> for PropertyValue {
    fn from(r: Vec<Record>) -> Self {
        PropertyValue::Records(r)
    }
}

impl From<Record> for PropertyValue {
    fn from(r: Record) -> Self {
        PropertyValue::Records(vec![r])
    }
}
