//! Value types for widemap
//!
//! This module defines:
//! - Value: application-side tagged value carried by entities, predicates and filters
//! - WireValue: store-side value, the only shape the store client ever sees
//!
//! The Value Codec (`crate::codec`) is the single bridge between the two.
//!
//! ## Type Rules
//!
//! - No implicit type coercions: `Int(1) != Float(1.0)`
//! - `Bytes` are not `String`
//! - `Value` floats use IEEE-754 equality (`NaN != NaN`)
//! - `WireValue` has a total order so it can key an ordered table; floats
//!   compare with `total_cmp`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Application value type
///
/// Used uniformly for entity fields, key predicates, filter operands and
/// cursor payloads. Serializes with an explicit variant tag so that a value
/// read back from JSON keeps its original variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point (IEEE-754)
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Point in time, UTC
    Date(DateTime<Utc>),
    /// Array of values
    Array(Vec<Value>),
    /// Object with string keys
    Object(BTreeMap<String, Value>),
}

// Custom PartialEq implementation for IEEE-754 float semantics
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
            Value::Date(_) => "Date",
            Value::Array(_) => "Array",
            Value::Object(_) => "Object",
        }
    }

    /// Check if this is a null value
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get as bool if this is a Bool value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64 if this is an Int value
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64 if this is a Float value
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get as &str if this is a String value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as a timestamp if this is a Date value
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Convert into a JSON value for composite column storage.
    ///
    /// Dates become RFC 3339 strings and bytes become arrays of numbers,
    /// so this direction is lossy for those two variants.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => {
                serde_json::Value::Array(b.iter().map(|&byte| byte.into()).collect())
            }
            Value::Date(d) => serde_json::Value::String(d.to_rfc3339()),
            Value::Array(arr) => serde_json::Value::Array(arr.iter().map(Value::to_json).collect()),
            Value::Object(obj) => serde_json::Value::Object(
                obj.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

// ============================================================================
// From implementations for ergonomic API usage
// ============================================================================

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Array(a)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(o: BTreeMap<String, Value>) -> Self {
        Value::Object(o)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => {
                Value::Array(arr.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(obj) => {
                Value::Object(obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

// ============================================================================
// WireValue
// ============================================================================

/// Store-side value
///
/// The store natively understands six primitive shapes. Dates and composites
/// never reach the store as such; the codec lowers them to `Int`/`Text`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireValue {
    /// Absent / null attribute
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit integer
    Int(i64),
    /// Double
    Float(f64),
    /// UTF-8 text
    Text(String),
    /// Binary
    Bytes(Vec<u8>),
}

impl WireValue {
    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            WireValue::Null => "Null",
            WireValue::Bool(_) => "Bool",
            WireValue::Int(_) => "Int",
            WireValue::Float(_) => "Float",
            WireValue::Text(_) => "Text",
            WireValue::Bytes(_) => "Bytes",
        }
    }

    /// Check if this is a null value
    pub fn is_null(&self) -> bool {
        matches!(self, WireValue::Null)
    }

    fn rank(&self) -> u8 {
        match self {
            WireValue::Null => 0,
            WireValue::Bool(_) => 1,
            WireValue::Int(_) => 2,
            WireValue::Float(_) => 3,
            WireValue::Text(_) => 4,
            WireValue::Bytes(_) => 5,
        }
    }
}

/// Exact comparison of an integer against a float
///
/// NaN sorts where `total_cmp` puts it: positive NaN above every number,
/// negative NaN below.
fn cmp_int_float(i: i64, f: f64) -> Ordering {
    // 2^63, the first float above i64::MAX
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if f.is_nan() {
        return if f.is_sign_negative() { Ordering::Greater } else { Ordering::Less };
    }
    if f >= LIMIT {
        return Ordering::Less;
    }
    if f < -LIMIT {
        return Ordering::Greater;
    }
    let whole = f.trunc();
    // In range and integral, so the cast is exact.
    match i.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0f64.partial_cmp(&(f - whole)).unwrap_or(Ordering::Equal),
        unequal => unequal,
    }
}

impl Ord for WireValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (WireValue::Null, WireValue::Null) => Ordering::Equal,
            (WireValue::Bool(a), WireValue::Bool(b)) => a.cmp(b),
            (WireValue::Int(a), WireValue::Int(b)) => a.cmp(b),
            (WireValue::Float(a), WireValue::Float(b)) => a.total_cmp(b),
            // Numbers interleave by value; equal values fall back to rank.
            (WireValue::Int(a), WireValue::Float(b)) => {
                cmp_int_float(*a, *b).then(self.rank().cmp(&other.rank()))
            }
            (WireValue::Float(a), WireValue::Int(b)) => cmp_int_float(*b, *a)
                .reverse()
                .then(self.rank().cmp(&other.rank())),
            (WireValue::Text(a), WireValue::Text(b)) => a.as_bytes().cmp(b.as_bytes()),
            (WireValue::Bytes(a), WireValue::Bytes(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for WireValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Equality follows the total order so WireValue can key a BTreeMap.
impl PartialEq for WireValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for WireValue {}

impl fmt::Display for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireValue::Null => write!(f, "null"),
            WireValue::Bool(b) => write!(f, "{b}"),
            WireValue::Int(i) => write!(f, "{i}"),
            WireValue::Float(x) => write!(f, "{x}"),
            WireValue::Text(s) => write!(f, "{s:?}"),
            WireValue::Bytes(b) => {
                let hex: String = b.iter().map(|x| format!("{x:02x}")).collect();
                write!(f, "0x{hex}")
            }
        }
    }
}

impl From<&str> for WireValue {
    fn from(s: &str) -> Self {
        WireValue::Text(s.to_string())
    }
}

impl From<String> for WireValue {
    fn from(s: String) -> Self {
        WireValue::Text(s)
    }
}

impl From<i64> for WireValue {
    fn from(i: i64) -> Self {
        WireValue::Int(i)
    }
}

impl From<bool> for WireValue {
    fn from(b: bool) -> Self {
        WireValue::Bool(b)
    }
}

/// Render a key tuple for error messages and logs.
pub fn render_key(parts: &[WireValue]) -> String {
    let inner: Vec<String> = parts.iter().map(ToString::to_string).collect();
    format!("[{}]", inner.join(", "))
}
