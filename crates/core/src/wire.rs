//! Wire encoding for Parsel values.
//!
//! Structured values travel as JSON objects tagged with `__type`:
//!
//! | Type | JSON Representation |
//! |------|---------------------|
//! | GeoPoint | `{"__type":"GeoPoint","latitude":..,"longitude":..}` |
//! | Date | `{"__type":"Date","iso":"2015-03-01T12:30:45.123Z"}` |
//! | Bytes | `{"__type":"Bytes","base64":".."}` |
//! | Pointer | `{"__type":"Pointer","className":..,"objectId":..}` |
//! | Embedded record | `{"__type":"Object","className":..,"objectId":..,...}` |
//! | ACL | plain object under the `ACL` field |
//! | Custom | `{"__type":"<registered tag>",...fields}` |
//!
//! Decoding resolves every `__type` through the [`TypeRegistry`] and fails
//! closed: an unregistered tag is an error, never a raw map. Plain strings with
//! the exact date layout decode to dates.

use serde_json::{json, Map, Number, Value as JsonValue};

use crate::error::{Error, Result};
use crate::record::Record;
use crate::registry::{Constructor, TypeRegistry};
use crate::typed::{Date, Fields, Pointer, TypedData, TypedValue, ACL_TAG};
use crate::value::Value;

/// JSON object as sent and received
pub type JsonMap = Map<String, JsonValue>;

/// Discriminator key of tagged values
pub const TYPE_KEY: &str = "__type";

/// Reserved field holding the access-control list
pub const ACL_KEY: &str = "ACL";

/// Tag of a fully embedded record (returned for included pointers)
pub const OBJECT_TAG: &str = "Object";

/// Operation key used for field-level updates
pub const OP_KEY: &str = "__op";

/// `{"__op":"Delete"}`: removes a field on update
pub fn delete_op() -> JsonValue {
    json!({OP_KEY: "Delete"})
}

/// Whether a wire value is the field-removal operation
pub fn is_delete_op(value: &JsonValue) -> bool {
    value.get(OP_KEY).and_then(JsonValue::as_str) == Some("Delete")
}

/// Pointer resolver that requires the record to be saved already
pub fn existing_pointer(record: &Record) -> Result<Pointer> {
    record.pointer().ok_or_else(|| Error::MissingIdentifier {
        class_name: record.class_name().to_string(),
    })
}

/// JSON number for a float, rejecting NaN and infinities
pub fn finite_number(f: f64) -> Result<JsonValue> {
    Number::from_f64(f)
        .map(JsonValue::Number)
        .ok_or_else(|| Error::Serialization {
            reason: format!("non-finite float {} has no JSON encoding", f),
        })
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a value.
///
/// Records become pointers through `pointer_for`, which may persist the record
/// first.
pub fn encode_value(
    value: &Value,
    pointer_for: &mut dyn FnMut(&Record) -> Result<Pointer>,
) -> Result<JsonValue> {
    match value {
        Value::Null => Ok(JsonValue::Null),
        Value::Bool(b) => Ok(JsonValue::Bool(*b)),
        Value::Int(i) => Ok(JsonValue::Number((*i).into())),
        Value::Float(f) => finite_number(*f),
        Value::String(s) => Ok(JsonValue::String(s.clone())),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(encode_value(item, pointer_for)?);
            }
            Ok(JsonValue::Array(out))
        }
        Value::Object(map) => encode_fields(map, pointer_for).map(JsonValue::Object),
        Value::Typed(typed) => encode_typed(&typed.snapshot(), pointer_for),
        Value::Record(record) => Ok(pointer_for(record)?.to_wire()),
    }
}

/// Encode the data of a typed value
pub fn encode_typed(
    data: &TypedData,
    pointer_for: &mut dyn FnMut(&Record) -> Result<Pointer>,
) -> Result<JsonValue> {
    match data {
        TypedData::GeoPoint(g) => g.to_wire(),
        TypedData::Date(d) => Ok(d.to_wire()),
        TypedData::Bytes(b) => Ok(b.to_wire()),
        TypedData::Pointer(p) => Ok(p.to_wire()),
        TypedData::Acl(fields) => encode_fields(fields, pointer_for).map(JsonValue::Object),
        TypedData::Custom { tag, fields } => {
            let mut map = encode_fields(fields, pointer_for)?;
            map.insert(TYPE_KEY.to_string(), JsonValue::String(tag.clone()));
            Ok(JsonValue::Object(map))
        }
    }
}

fn encode_fields(
    fields: &Fields,
    pointer_for: &mut dyn FnMut(&Record) -> Result<Pointer>,
) -> Result<JsonMap> {
    let mut map = JsonMap::new();
    for (k, v) in fields {
        map.insert(k.clone(), encode_value(v, pointer_for)?);
    }
    Ok(map)
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode one wire value held under `key`.
///
/// `key` is the top-level field name, if any; only the top-level `ACL` field
/// is treated as an access-control list.
pub fn decode_value(registry: &TypeRegistry, key: Option<&str>, json: &JsonValue) -> Result<Value> {
    match json {
        JsonValue::Null => Ok(Value::Null),
        JsonValue::Bool(b) => Ok(Value::Bool(*b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::Int(i)),
            None => n
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| Error::invalid_wire(format!("unrepresentable number {}", n))),
        },
        JsonValue::String(s) => Ok(match Date::parse_wire_str(s) {
            Some(date) => Value::Typed(TypedValue::date(date)),
            None => Value::String(s.clone()),
        }),
        JsonValue::Array(items) => items
            .iter()
            .map(|item| decode_value(registry, None, item))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        JsonValue::Object(map) => {
            if let Some(tag) = map.get(TYPE_KEY) {
                let tag = tag
                    .as_str()
                    .ok_or_else(|| Error::invalid_wire("__type must be a string"))?;
                if tag == OBJECT_TAG {
                    return decode_embedded_record(registry, map).map(Value::Record);
                }
                return decode_typed(registry, tag, map).map(Value::Typed);
            }
            if key == Some(ACL_KEY) {
                return decode_typed(registry, ACL_TAG, map).map(Value::Typed);
            }
            decode_fields(registry, map).map(Value::Object)
        }
    }
}

/// Decode a tagged object through its registered constructor
pub fn decode_typed(registry: &TypeRegistry, tag: &str, map: &JsonMap) -> Result<TypedValue> {
    match registry.resolve(tag)? {
        Constructor::Value(decode) => {
            let mut fields = map.clone();
            fields.remove(TYPE_KEY);
            Ok(TypedValue::new(decode(tag, &fields, registry)?))
        }
        Constructor::Record(_) => Err(Error::WrongKind {
            name: tag.to_string(),
            expected: "value type",
        }),
    }
}

/// Decode every entry of a plain object
pub fn decode_fields(registry: &TypeRegistry, map: &JsonMap) -> Result<Fields> {
    map.iter()
        .map(|(k, v)| decode_value(registry, None, v).map(|value| (k.clone(), value)))
        .collect()
}

fn decode_embedded_record(registry: &TypeRegistry, map: &JsonMap) -> Result<Record> {
    let class_name = map
        .get("className")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| Error::invalid_wire("embedded object is missing 'className'"))?;
    let class = registry.resolve_class(class_name)?;

    let mut fields = map.clone();
    fields.remove(TYPE_KEY);
    fields.remove("className");

    let record = class.create();
    record.refresh(registry, &fields)?;
    Ok(record)
}
