//! Records: persistable, dirty-tracking documents
//!
//! A [`Record`] is a shared handle to one document of a [`RecordClass`]. It
//! holds the server metadata (`objectId`, `createdAt`, `updatedAt`), an open
//! field map, the set of dirty field names and the `loaded` flag.
//!
//! ## Field interception
//!
//! Every write goes through [`Record::set`] / [`Record::unset`], which keep
//! the dirty set and the parent links of nested typed values in step with the
//! field map. Reserved metadata names are rejected outright; class-protected
//! names (e.g. a user's `sessionToken`) are stored but never dirtied.
//!
//! ## Records inside records
//!
//! A record held in a field of another record is never embedded: it is sent
//! as a Pointer and holds no parent link, so mutating it never dirties the
//! holder.
//!
//! ## Applying responses
//!
//! Wire payloads are decoded completely before any of them is applied, so a
//! decode failure leaves the record exactly as it was.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::registry::TypeRegistry;
use crate::typed::{Date, Owner, Pointer, TypedValue};
use crate::value::Value;
use crate::wire::{self, JsonMap};

/// Metadata names no client write may touch
pub const RESERVED_FIELDS: [&str; 5] = ["objectId", "createdAt", "updatedAt", "className", "__type"];

/// Whether `name` is reserved metadata
pub fn is_reserved(name: &str) -> bool {
    RESERVED_FIELDS.contains(&name)
}

// =============================================================================
// RecordClass
// =============================================================================

#[derive(Debug)]
struct ClassInfo {
    name: String,
    protected: BTreeSet<String>,
}

/// A named class of records
///
/// One class per logical remote class; the name is data, not a Rust type.
/// Handles are cheap to clone and compare by identity via
/// [`RecordClass::same_class`].
#[derive(Clone)]
pub struct RecordClass(Arc<ClassInfo>);

impl RecordClass {
    /// Class with no extra protected fields
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_protected(name, std::iter::empty::<String>())
    }

    /// Class whose extra `protected` fields are stored but never dirtied
    pub fn with_protected<I, S>(name: impl Into<String>, protected: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RecordClass(Arc::new(ClassInfo {
            name: name.into(),
            protected: protected.into_iter().map(Into::into).collect(),
        }))
    }

    /// Remote class name
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Whether `field` can never be dirty on records of this class
    pub fn is_protected(&self, field: &str) -> bool {
        is_reserved(field) || self.0.protected.contains(field)
    }

    /// Whether both handles are the same registered class
    pub fn same_class(&self, other: &RecordClass) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// New, unsaved record
    pub fn create(&self) -> Record {
        Record(Arc::new(RecordCell {
            class: self.clone(),
            state: Mutex::new(RecordState::default()),
        }))
    }

    /// New, unsaved record with initial fields, each of which starts dirty
    pub fn create_with<I, K, V>(&self, fields: I) -> Result<Record>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let record = self.create();
        for (name, value) in fields {
            record.set(name, value)?;
        }
        Ok(record)
    }
}

impl fmt::Debug for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RecordClass").field(&self.0.name).finish()
    }
}

// =============================================================================
// Record state
// =============================================================================

#[derive(Default)]
struct RecordState {
    id: Option<String>,
    created_at: Option<Date>,
    updated_at: Option<Date>,
    fields: BTreeMap<String, Value>,
    dirty: BTreeSet<String>,
    loaded: bool,
    deleted: bool,
}

/// Result of checking a parent link against the current field graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkState {
    Live,
    Stale,
}

pub(crate) struct RecordCell {
    class: RecordClass,
    state: Mutex<RecordState>,
}

impl RecordCell {
    /// A typed value held under `attribute` changed.
    ///
    /// The link is stale when the field no longer holds that exact instance.
    pub(crate) fn child_changed(cell: &Arc<RecordCell>, attribute: &str, child: &TypedValue) -> LinkState {
        let mut state = cell.state.lock();
        let holds = state
            .fields
            .get(attribute)
            .map_or(false, |value| value.holds(child));
        if !holds {
            return LinkState::Stale;
        }
        if !cell.class.is_protected(attribute) {
            state.dirty.insert(attribute.to_string());
        }
        LinkState::Live
    }
}

/// Response payload decoded but not yet applied
struct Decoded {
    id: Option<String>,
    created_at: Option<Date>,
    updated_at: Option<Date>,
    fields: Vec<(String, Value)>,
}

// =============================================================================
// Record
// =============================================================================

/// Shared handle to one document
///
/// Cloning the handle does not copy the document. Two handles are equal only
/// when they refer to the same instance.
#[derive(Clone)]
pub struct Record(Arc<RecordCell>);

impl Record {
    /// Record that only carries an id; call fetch to hydrate it
    pub fn unfetched(class: RecordClass, id: impl Into<String>) -> Self {
        let record = class.create();
        record.0.state.lock().id = Some(id.into());
        record
    }

    /// Class of this record
    pub fn class(&self) -> &RecordClass {
        &self.0.class
    }

    /// Remote class name
    pub fn class_name(&self) -> &str {
        self.0.class.name()
    }

    /// Server-assigned id, if saved
    pub fn id(&self) -> Option<String> {
        self.0.state.lock().id.clone()
    }

    /// Creation time reported by the server
    pub fn created_at(&self) -> Option<Date> {
        self.0.state.lock().created_at
    }

    /// Last update time reported by the server
    pub fn updated_at(&self) -> Option<Date> {
        self.0.state.lock().updated_at
    }

    /// Whether the record reflects a full remote read or a save
    pub fn is_loaded(&self) -> bool {
        self.0.state.lock().loaded
    }

    /// Whether a delete of this record's id succeeded
    pub fn is_deleted(&self) -> bool {
        self.0.state.lock().deleted
    }

    /// Record that the remote object is gone. Fields and id are kept.
    pub fn mark_deleted(&self) {
        self.0.state.lock().deleted = true;
    }

    /// Field names changed since the last sync
    pub fn dirty_keys(&self) -> BTreeSet<String> {
        self.0.state.lock().dirty.clone()
    }

    /// Whether any field changed since the last sync
    pub fn is_dirty(&self) -> bool {
        !self.0.state.lock().dirty.is_empty()
    }

    /// Whether both handles refer to the same instance
    pub fn ptr_eq(&self, other: &Record) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Pointer to this record, if it has an id
    pub fn pointer(&self) -> Option<Pointer> {
        self.id().map(|id| Pointer::new(self.class_name(), id))
    }

    /// Copy of every field
    pub fn fields(&self) -> BTreeMap<String, Value> {
        self.0.state.lock().fields.clone()
    }

    /// Whether the field is held locally
    pub fn contains(&self, name: &str) -> bool {
        self.0.state.lock().fields.contains_key(name)
    }

    /// Read a field
    pub fn get(&self, name: &str) -> Result<Value> {
        self.try_get(name).ok_or_else(|| Error::AttributeNotFound {
            name: name.to_string(),
        })
    }

    /// Read a field, `None` when absent
    pub fn try_get(&self, name: &str) -> Option<Value> {
        self.0.state.lock().fields.get(name).cloned()
    }

    // =========================================================================
    // Interception
    // =========================================================================

    /// Set a field, marking it dirty and linking nested typed values
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let name = name.into();
        if is_reserved(&name) {
            return Err(Error::ProtectedField { name });
        }
        let value = value.into();
        let mut state = self.0.state.lock();
        if !self.0.class.is_protected(&name) {
            state.dirty.insert(name.clone());
        }
        self.store_field(&mut state, name, value);
        Ok(())
    }

    /// Remove a field; the removal is sent on the next save
    pub fn unset(&self, name: &str) -> Result<Option<Value>> {
        if is_reserved(name) {
            return Err(Error::ProtectedField {
                name: name.to_string(),
            });
        }
        let mut state = self.0.state.lock();
        let removed = self.remove_field(&mut state, name);
        if removed.is_some() && !self.0.class.is_protected(name) {
            state.dirty.insert(name.to_string());
        }
        Ok(removed)
    }

    fn store_field(&self, state: &mut RecordState, name: String, value: Value) {
        self.remove_field(state, &name);
        for child in value.typed_children() {
            child.add_parent(Owner::Record(Arc::downgrade(&self.0)), name.clone());
        }
        state.fields.insert(name, value);
    }

    fn remove_field(&self, state: &mut RecordState, name: &str) -> Option<Value> {
        let removed = state.fields.remove(name)?;
        let owner_id = self.identity();
        for child in removed.typed_children() {
            child.remove_parent(owner_id, name);
        }
        Some(removed)
    }

    // =========================================================================
    // Marshalling
    // =========================================================================

    /// Wire body for exactly the dirty fields.
    ///
    /// Removed fields become `{"__op":"Delete"}`. Records held in fields are
    /// turned into pointers by `pointer_for`, which may save them first.
    pub fn marshal_dirty(&self, pointer_for: &mut dyn FnMut(&Record) -> Result<Pointer>) -> Result<JsonMap> {
        let entries: Vec<(String, Option<Value>)> = {
            let state = self.0.state.lock();
            state
                .dirty
                .iter()
                .map(|name| (name.clone(), state.fields.get(name).cloned()))
                .collect()
        };

        let mut body = JsonMap::new();
        for (name, value) in entries {
            let encoded = match value {
                Some(value) => wire::encode_value(&value, pointer_for)?,
                None => wire::delete_op(),
            };
            body.insert(name, encoded);
        }
        Ok(body)
    }

    /// Merge a wire payload into the record.
    ///
    /// Each applied field leaves the dirty set; `loaded` is set as given.
    pub fn unmarshal(&self, registry: &TypeRegistry, payload: &JsonMap, loaded: bool) -> Result<()> {
        let decoded = decode_payload(registry, payload)?;
        let mut state = self.0.state.lock();
        self.apply_metadata(&mut state, &decoded)?;
        for (name, value) in decoded.fields {
            state.dirty.remove(&name);
            self.store_field(&mut state, name, value);
        }
        state.loaded = loaded;
        Ok(())
    }

    /// Replace every field from a full remote read
    pub fn refresh(&self, registry: &TypeRegistry, payload: &JsonMap) -> Result<()> {
        let decoded = decode_payload(registry, payload)?;
        let mut state = self.0.state.lock();
        self.apply_metadata(&mut state, &decoded)?;
        let names: Vec<String> = state.fields.keys().cloned().collect();
        for name in names {
            self.remove_field(&mut state, &name);
        }
        for (name, value) in decoded.fields {
            self.store_field(&mut state, name, value);
        }
        state.dirty.clear();
        state.loaded = true;
        Ok(())
    }

    /// Apply a create/update response.
    ///
    /// Clears the dirty set. A create also sets `updatedAt` to `createdAt`
    /// and marks the record loaded; an update leaves `loaded` alone.
    pub fn apply_save(&self, registry: &TypeRegistry, payload: &JsonMap) -> Result<()> {
        let mut decoded = decode_payload(registry, payload)?;
        let mut state = self.0.state.lock();
        let created = state.id.is_none();
        if created && decoded.id.is_none() {
            return Err(Error::invalid_wire("create response carries no objectId"));
        }
        if created && decoded.updated_at.is_none() {
            decoded.updated_at = decoded.created_at;
        }
        self.apply_metadata(&mut state, &decoded)?;
        for (name, value) in decoded.fields {
            self.store_field(&mut state, name, value);
        }
        state.dirty.clear();
        if created {
            state.loaded = true;
        }
        Ok(())
    }

    fn apply_metadata(&self, state: &mut RecordState, decoded: &Decoded) -> Result<()> {
        if let Some(id) = &decoded.id {
            match &state.id {
                Some(current) if current != id => {
                    return Err(Error::IdentifierMismatch {
                        expected: current.clone(),
                        actual: id.clone(),
                    })
                }
                Some(_) => {}
                None => state.id = Some(id.clone()),
            }
        }
        if decoded.created_at.is_some() {
            state.created_at = decoded.created_at;
        }
        if decoded.updated_at.is_some() {
            state.updated_at = decoded.updated_at;
        }
        Ok(())
    }
}

fn decode_payload(registry: &TypeRegistry, payload: &JsonMap) -> Result<Decoded> {
    let mut decoded = Decoded {
        id: None,
        created_at: None,
        updated_at: None,
        fields: Vec::with_capacity(payload.len()),
    };
    for (key, value) in payload {
        match key.as_str() {
            "objectId" => {
                let id = value
                    .as_str()
                    .ok_or_else(|| Error::invalid_wire("objectId must be a string"))?;
                decoded.id = Some(id.to_string());
            }
            "createdAt" => decoded.created_at = Some(decode_timestamp(key, value)?),
            "updatedAt" => decoded.updated_at = Some(decode_timestamp(key, value)?),
            "className" | "__type" => {}
            _ => {
                let value = wire::decode_value(registry, Some(key), value)?;
                decoded.fields.push((key.clone(), value));
            }
        }
    }
    Ok(decoded)
}

fn decode_timestamp(key: &str, value: &JsonValue) -> Result<Date> {
    match value {
        JsonValue::String(s) => Date::from_iso(s),
        JsonValue::Object(map) => Date::from_wire(map),
        _ => Err(Error::invalid_wire(format!("{} must be a date", key))),
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Field values may point back at this record; print metadata only.
        let state = self.0.state.lock();
        f.debug_struct("Record")
            .field("class_name", &self.class_name())
            .field("id", &state.id)
            .field("dirty", &state.dirty)
            .field("loaded", &state.loaded)
            .finish()
    }
}
