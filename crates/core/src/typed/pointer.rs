//! Lightweight reference to a stored record

use serde_json::{json, Value as JsonValue};

use crate::error::{Error, Result};
use crate::record::Record;
use crate::registry::TypeRegistry;
use crate::wire::JsonMap;

/// Class name plus object id
///
/// Stands in for an embedded record on the wire. Resolving a pointer never
/// performs I/O: [`Pointer::load`] only builds an unfetched record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pointer {
    class_name: String,
    object_id: String,
}

impl Pointer {
    /// Wire tag
    pub const TAG: &'static str = "Pointer";

    /// Create a pointer
    pub fn new(class_name: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            object_id: object_id.into(),
        }
    }

    /// Class of the referenced record
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Id of the referenced record
    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    /// `{"__type":"Pointer","className":..,"objectId":..}`
    pub fn to_wire(&self) -> JsonValue {
        json!({
            "__type": Self::TAG,
            "className": self.class_name,
            "objectId": self.object_id,
        })
    }

    /// Decode from the wire fields (the `__type` key is ignored)
    pub fn from_wire(map: &JsonMap) -> Result<Self> {
        let field = |name: &str| {
            map.get(name)
                .and_then(JsonValue::as_str)
                .map(str::to_string)
                .ok_or_else(|| Error::invalid_wire(format!("Pointer is missing string '{}'", name)))
        };
        Ok(Self::new(field("className")?, field("objectId")?))
    }

    /// Build an unfetched record of the registered class carrying this id.
    ///
    /// The record is not loaded; call fetch on it to hydrate its fields.
    pub fn load(&self, registry: &TypeRegistry) -> Result<Record> {
        let class = registry.resolve_class(&self.class_name)?;
        Ok(Record::unfetched(class, self.object_id.clone()))
    }
}
