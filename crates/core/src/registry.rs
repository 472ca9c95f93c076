//! Type registry
//!
//! Maps wire discriminators (`__type` tags and class names) to constructors.
//! Decoding consults the registry for every tagged value and fails with
//! [`Error::UnknownType`] for anything unregistered.
//!
//! Registration is idempotent: registering a name twice returns the
//! constructor that was registered first.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::info;

use crate::error::{Error, Result};
use crate::record::RecordClass;
use crate::typed::{Binary, Date, GeoPoint, Pointer, TypedData, ACL_TAG};
use crate::wire::{self, JsonMap};

/// Class name of the built-in user class
pub const USER_CLASS: &str = "_User";

/// User fields only the server may write
pub const USER_PROTECTED: [&str; 3] = ["username", "sessionToken", "emailVerified"];

/// Builds typed data from the fields of a tagged wire object (without `__type`)
pub type ValueDecoder = fn(&str, &JsonMap, &TypeRegistry) -> Result<TypedData>;

/// What a registered name constructs
#[derive(Clone)]
pub enum Constructor {
    /// A typed value
    Value(ValueDecoder),
    /// A record class
    Record(RecordClass),
}

impl std::fmt::Debug for Constructor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constructor::Value(_) => f.write_str("Constructor::Value"),
            Constructor::Record(class) => write!(f, "Constructor::Record({})", class.name()),
        }
    }
}

/// Process-wide registry used when callers do not bring their own
static GLOBAL: Lazy<Arc<TypeRegistry>> = Lazy::new(|| Arc::new(TypeRegistry::with_builtins()));

/// Registry of value types and record classes
///
/// Safe to share between threads; lookups take a read lock.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    entries: RwLock<HashMap<String, Constructor>>,
}

impl TypeRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with GeoPoint, Date, Bytes, Pointer, ACL and `_User`
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(GeoPoint::TAG, Constructor::Value(decode_geo_point));
        registry.register(Date::TAG, Constructor::Value(decode_date));
        registry.register(Binary::TAG, Constructor::Value(decode_bytes));
        registry.register(Pointer::TAG, Constructor::Value(decode_pointer));
        registry.register(ACL_TAG, Constructor::Value(decode_acl));
        registry.register(
            USER_CLASS,
            Constructor::Record(RecordClass::with_protected(USER_CLASS, USER_PROTECTED)),
        );
        registry
    }

    /// Shared process-wide registry, pre-loaded with the built-ins
    pub fn global() -> Arc<TypeRegistry> {
        Arc::clone(&GLOBAL)
    }

    /// Register a constructor, returning whichever one ends up registered
    pub fn register(&self, name: impl Into<String>, constructor: Constructor) -> Constructor {
        let name = name.into();
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(&name) {
            return existing.clone();
        }
        info!(target: "parsel::registry", name = %name, kind = ?constructor, "Registered type");
        entries.insert(name, constructor.clone());
        constructor
    }

    /// Register a record class with no extra protected fields.
    ///
    /// Returns the existing class when the name is already a record class.
    /// A name already taken by a value type is left untouched and a detached
    /// class is returned.
    pub fn register_class(&self, name: impl Into<String>) -> RecordClass {
        let name = name.into();
        let class = RecordClass::new(name.clone());
        match self.register(name, Constructor::Record(class.clone())) {
            Constructor::Record(registered) => registered,
            Constructor::Value(_) => class,
        }
    }

    /// Register a custom container value type under `tag`
    pub fn register_value_type(&self, tag: impl Into<String>) {
        self.register(tag, Constructor::Value(decode_custom));
    }

    /// Look up a registered name
    pub fn resolve(&self, name: &str) -> Result<Constructor> {
        self.entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownType {
                name: name.to_string(),
            })
    }

    /// Look up a name that must be a record class
    pub fn resolve_class(&self, name: &str) -> Result<RecordClass> {
        match self.resolve(name)? {
            Constructor::Record(class) => Ok(class),
            Constructor::Value(_) => Err(Error::WrongKind {
                name: name.to_string(),
                expected: "record class",
            }),
        }
    }

    /// Whether a name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }
}

// =============================================================================
// Built-in decoders
// =============================================================================

fn decode_geo_point(_: &str, map: &JsonMap, _: &TypeRegistry) -> Result<TypedData> {
    GeoPoint::from_wire(map).map(TypedData::GeoPoint)
}

fn decode_date(_: &str, map: &JsonMap, _: &TypeRegistry) -> Result<TypedData> {
    Date::from_wire(map).map(TypedData::Date)
}

fn decode_bytes(_: &str, map: &JsonMap, _: &TypeRegistry) -> Result<TypedData> {
    Binary::from_wire(map).map(TypedData::Bytes)
}

fn decode_pointer(_: &str, map: &JsonMap, _: &TypeRegistry) -> Result<TypedData> {
    Pointer::from_wire(map).map(TypedData::Pointer)
}

fn decode_acl(_: &str, map: &JsonMap, registry: &TypeRegistry) -> Result<TypedData> {
    wire::decode_fields(registry, map).map(TypedData::Acl)
}

fn decode_custom(tag: &str, map: &JsonMap, registry: &TypeRegistry) -> Result<TypedData> {
    Ok(TypedData::Custom {
        tag: tag.to_string(),
        fields: wire::decode_fields(registry, map)?,
    })
}
