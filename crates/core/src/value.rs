//! Value types for Parsel
//!
//! This module defines:
//! - Value: the attribute value held by a record field
//!
//! ## Value Model
//!
//! A field holds one of:
//! - a JSON scalar: `Null`, `Bool`, `Int`, `Float`, `String`
//! - a nested collection: `Array`, `Object`
//! - a [`TypedValue`] (GeoPoint, Date, Bytes, Pointer, ACL, custom)
//! - a [`Record`], which is only ever sent as a Pointer
//!
//! ### Equality
//!
//! - Scalars and collections compare structurally; `Int(1) != Float(1.0)`
//! - Typed values compare structurally (two GeoPoints at the same spot are equal)
//! - Records compare by identity: two handles are equal only if they are the
//!   same object

use std::collections::BTreeMap;

use crate::record::Record;
use crate::typed::{Date, GeoPoint, TypedValue};

/// Attribute value stored in a record field
#[derive(Debug, Clone)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Array of values
    Array(Vec<Value>),
    /// Object with string keys and no type tag
    Object(BTreeMap<String, Value>),
    /// Tagged value with its own identity and parent links
    Typed(TypedValue),
    /// Reference to another record
    Record(Record),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Typed(a), Value::Typed(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a.ptr_eq(b),
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
            Value::Array(_) => "Array",
            Value::Object(_) => "Object",
            Value::Typed(_) => "Typed",
            Value::Record(_) => "Record",
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

    /// Get as &[Value] if this is an Array value
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get as &BTreeMap if this is an Object value
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Get the typed value handle
    pub fn as_typed(&self) -> Option<&TypedValue> {
        match self {
            Value::Typed(t) => Some(t),
            _ => None,
        }
    }

    /// Get the record handle
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Copy of the GeoPoint, if this holds one
    pub fn as_geo_point(&self) -> Option<GeoPoint> {
        self.as_typed().and_then(TypedValue::geo_point_data)
    }

    /// Copy of the Date, if this holds one
    pub fn as_date(&self) -> Option<Date> {
        self.as_typed().and_then(TypedValue::date_data)
    }

    /// Typed values held directly by this value.
    ///
    /// Descends into arrays and objects but stops at typed values and
    /// records: a typed container owns its own children, and records are
    /// never embedded.
    pub(crate) fn typed_children(&self) -> Vec<TypedValue> {
        let mut out = Vec::new();
        self.collect_typed(&mut out);
        out
    }

    fn collect_typed(&self, out: &mut Vec<TypedValue>) {
        match self {
            Value::Typed(t) => out.push(t.clone()),
            Value::Array(items) => items.iter().for_each(|v| v.collect_typed(out)),
            Value::Object(map) => map.values().for_each(|v| v.collect_typed(out)),
            _ => {}
        }
    }

    /// Whether `target` is one of [`Value::typed_children`], by identity
    pub(crate) fn holds(&self, target: &TypedValue) -> bool {
        match self {
            Value::Typed(t) => t.ptr_eq(target),
            Value::Array(items) => items.iter().any(|v| v.holds(target)),
            Value::Object(map) => map.values().any(|v| v.holds(target)),
            _ => false,
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
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Object(map)
    }
}

impl From<TypedValue> for Value {
    fn from(t: TypedValue) -> Self {
        Value::Typed(t)
    }
}

impl From<&TypedValue> for Value {
    fn from(t: &TypedValue) -> Self {
        Value::Typed(t.clone())
    }
}

impl From<GeoPoint> for Value {
    fn from(g: GeoPoint) -> Self {
        Value::Typed(TypedValue::from(g))
    }
}

impl From<Date> for Value {
    fn from(d: Date) -> Self {
        Value::Typed(TypedValue::from(d))
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(r)
    }
}

impl From<&Record> for Value {
    fn from(r: &Record) -> Self {
        Value::Record(r.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}
