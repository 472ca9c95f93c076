//! Typed values and upward dirty propagation
//!
//! A [`TypedValue`] is a shared handle to one structured value (GeoPoint,
//! Date, Bytes, Pointer, ACL or a registered custom type). Handles compare
//! structurally, but every handle also has an identity: the owners that hold
//! it keep a non-owning back-reference (a *parent link*) keyed on that
//! identity and the attribute name it is held under.
//!
//! ## Ownership
//!
//! Records and container values own their field values through `Arc`; the
//! parent links point back through `Weak`. Ownership therefore only flows
//! downward and dropping a record never leaks its values.
//!
//! ## Propagation
//!
//! Any mutation through the handle calls [`TypedValue::notify_dirty`], which
//! walks the parent links:
//!
//! - a record parent gets the attribute added to its dirty set, unless the
//!   attribute is protected on that record
//! - a container parent (ACL, custom type) propagates further up
//! - a link whose owner was dropped, or whose owner no longer holds this
//!   exact instance under the attribute, is pruned
//!
//! Locks are never held across the walk: the link list is copied first and
//! each owner is locked only for its own check.

mod acl;
mod binary;
mod date;
mod geo_point;
mod pointer;

pub use acl::PUBLIC_ACCESS;
pub use binary::Binary;
pub use date::Date;
pub use geo_point::GeoPoint;
pub use pointer::Pointer;

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::{Error, Result};
use crate::record::{LinkState, RecordCell};
use crate::value::Value;
use crate::wire;

/// Field map of a container typed value
pub type Fields = BTreeMap<String, Value>;

/// Wire tag of the access-control list (which is sent without `__type`)
pub const ACL_TAG: &str = "ACL";

/// Data carried by a typed value
#[derive(Debug, Clone, PartialEq)]
pub enum TypedData {
    /// `{"__type":"GeoPoint","latitude":..,"longitude":..}`
    GeoPoint(GeoPoint),
    /// `{"__type":"Date","iso":".."}`
    Date(Date),
    /// `{"__type":"Bytes","base64":".."}`
    Bytes(Binary),
    /// `{"__type":"Pointer","className":..,"objectId":..}`
    Pointer(Pointer),
    /// Access-control list: principal -> `{"read": bool, "write": bool}`
    Acl(Fields),
    /// Registered custom tag carrying arbitrary fields
    Custom {
        /// Wire tag
        tag: String,
        /// Nested fields, which may hold further typed values
        fields: Fields,
    },
}

impl TypedData {
    /// Wire tag for this variant
    pub fn tag(&self) -> &str {
        match self {
            TypedData::GeoPoint(_) => GeoPoint::TAG,
            TypedData::Date(_) => Date::TAG,
            TypedData::Bytes(_) => Binary::TAG,
            TypedData::Pointer(_) => Pointer::TAG,
            TypedData::Acl(_) => ACL_TAG,
            TypedData::Custom { tag, .. } => tag,
        }
    }

    /// Nested fields, for container variants
    pub fn fields(&self) -> Option<&Fields> {
        match self {
            TypedData::Acl(fields) | TypedData::Custom { fields, .. } => Some(fields),
            _ => None,
        }
    }

    fn fields_mut(&mut self) -> Option<&mut Fields> {
        match self {
            TypedData::Acl(fields) | TypedData::Custom { fields, .. } => Some(fields),
            _ => None,
        }
    }
}

// =============================================================================
// Parent links
// =============================================================================

/// Non-owning back-reference to something holding a typed value
#[derive(Clone)]
pub(crate) enum Owner {
    Record(Weak<RecordCell>),
    Value(Weak<ValueCell>),
}

impl Owner {
    fn identity(&self) -> usize {
        match self {
            Owner::Record(weak) => weak.as_ptr() as *const () as usize,
            Owner::Value(weak) => weak.as_ptr() as *const () as usize,
        }
    }
}

#[derive(Clone)]
struct ParentLink {
    owner: Owner,
    attribute: String,
}

impl ParentLink {
    fn same_as(&self, other: &ParentLink) -> bool {
        self.owner.identity() == other.owner.identity() && self.attribute == other.attribute
    }
}

pub(crate) struct ValueCell {
    data: Mutex<TypedData>,
    parents: Mutex<Vec<ParentLink>>,
}

// =============================================================================
// TypedValue
// =============================================================================

/// Shared, identity-bearing handle to a typed value
///
/// Cloning the handle does not copy the value: both handles mutate the same
/// instance and share its parent links.
#[derive(Clone)]
pub struct TypedValue(Arc<ValueCell>);

impl TypedValue {
    /// Wrap data in a new handle.
    ///
    /// Typed values nested in a container's fields get this handle as their
    /// parent.
    pub fn new(data: TypedData) -> Self {
        let value = TypedValue(Arc::new(ValueCell {
            data: Mutex::new(data),
            parents: Mutex::new(Vec::new()),
        }));
        let children: Vec<(String, TypedValue)> = value
            .0
            .data
            .lock()
            .fields()
            .map(|fields| {
                fields
                    .iter()
                    .flat_map(|(name, v)| {
                        v.typed_children()
                            .into_iter()
                            .map(move |child| (name.clone(), child))
                    })
                    .collect()
            })
            .unwrap_or_default();
        for (name, child) in children {
            child.add_parent(value.as_owner(), name);
        }
        value
    }

    /// New GeoPoint
    pub fn geo_point(latitude: f64, longitude: f64) -> Self {
        Self::new(TypedData::GeoPoint(GeoPoint::new(latitude, longitude)))
    }

    /// New Date
    pub fn date(date: Date) -> Self {
        Self::new(TypedData::Date(date))
    }

    /// New binary value
    pub fn binary(binary: Binary) -> Self {
        Self::new(TypedData::Bytes(binary))
    }

    /// New Pointer
    pub fn pointer(pointer: Pointer) -> Self {
        Self::new(TypedData::Pointer(pointer))
    }

    /// New, empty ACL
    pub fn acl() -> Self {
        Self::new(TypedData::Acl(Fields::new()))
    }

    /// New, empty custom value with the given tag
    pub fn custom(tag: impl Into<String>) -> Self {
        Self::new(TypedData::Custom {
            tag: tag.into(),
            fields: Fields::new(),
        })
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// Whether both handles refer to the same instance
    pub fn ptr_eq(&self, other: &TypedValue) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    fn as_owner(&self) -> Owner {
        Owner::Value(Arc::downgrade(&self.0))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Wire tag
    pub fn tag(&self) -> String {
        self.0.data.lock().tag().to_string()
    }

    /// Copy of the current data
    pub fn snapshot(&self) -> TypedData {
        self.0.data.lock().clone()
    }

    /// GeoPoint data, if this is a GeoPoint
    pub fn geo_point_data(&self) -> Option<GeoPoint> {
        match &*self.0.data.lock() {
            TypedData::GeoPoint(g) => Some(*g),
            _ => None,
        }
    }

    /// Date data, if this is a Date
    pub fn date_data(&self) -> Option<Date> {
        match &*self.0.data.lock() {
            TypedData::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Binary data, if this is a Bytes value
    pub fn binary_data(&self) -> Option<Binary> {
        match &*self.0.data.lock() {
            TypedData::Bytes(b) => Some(b.clone()),
            _ => None,
        }
    }

    /// Pointer data, if this is a Pointer
    pub fn pointer_data(&self) -> Option<Pointer> {
        match &*self.0.data.lock() {
            TypedData::Pointer(p) => Some(p.clone()),
            _ => None,
        }
    }

    /// Nested field of a container value
    pub fn field(&self, name: &str) -> Option<Value> {
        self.0
            .data
            .lock()
            .fields()
            .and_then(|fields| fields.get(name).cloned())
    }

    /// Encode to the wire format.
    ///
    /// Records nested inside a custom value must already be saved.
    pub fn to_wire(&self) -> Result<JsonValue> {
        let data = self.snapshot();
        wire::encode_typed(&data, &mut wire::existing_pointer)
    }

    /// Number of live owners currently linked to this value
    pub fn parent_count(&self) -> usize {
        self.0
            .parents
            .lock()
            .iter()
            .filter(|link| match &link.owner {
                Owner::Record(w) => w.strong_count() > 0,
                Owner::Value(w) => w.strong_count() > 0,
            })
            .count()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    fn modify<T>(&self, f: impl FnOnce(&mut TypedData) -> Result<T>) -> Result<T> {
        let out = {
            let mut data = self.0.data.lock();
            f(&mut data)?
        };
        self.notify_dirty();
        Ok(out)
    }

    fn wrong_kind(data: &TypedData, expected: &'static str) -> Error {
        Error::WrongKind {
            name: data.tag().to_string(),
            expected,
        }
    }

    /// Move a GeoPoint
    pub fn set_geo_point(&self, point: GeoPoint) -> Result<()> {
        self.modify(|data| match data {
            TypedData::GeoPoint(g) => {
                *g = point;
                Ok(())
            }
            other => Err(Self::wrong_kind(other, GeoPoint::TAG)),
        })
    }

    /// Change a GeoPoint's latitude
    pub fn set_latitude(&self, latitude: f64) -> Result<()> {
        self.modify(|data| match data {
            TypedData::GeoPoint(g) => {
                g.latitude = latitude;
                Ok(())
            }
            other => Err(Self::wrong_kind(other, GeoPoint::TAG)),
        })
    }

    /// Change a GeoPoint's longitude
    pub fn set_longitude(&self, longitude: f64) -> Result<()> {
        self.modify(|data| match data {
            TypedData::GeoPoint(g) => {
                g.longitude = longitude;
                Ok(())
            }
            other => Err(Self::wrong_kind(other, GeoPoint::TAG)),
        })
    }

    /// Replace a Date's instant
    pub fn set_date(&self, date: Date) -> Result<()> {
        self.modify(|data| match data {
            TypedData::Date(d) => {
                *d = date;
                Ok(())
            }
            other => Err(Self::wrong_kind(other, Date::TAG)),
        })
    }

    /// Replace a Bytes value's content
    pub fn set_binary(&self, binary: Binary) -> Result<()> {
        self.modify(|data| match data {
            TypedData::Bytes(b) => {
                *b = binary;
                Ok(())
            }
            other => Err(Self::wrong_kind(other, Binary::TAG)),
        })
    }

    /// Set a nested field on a container value.
    ///
    /// Keeps the parent links of nested typed values in step with the field
    /// graph, then propagates dirtiness upward. Fails with
    /// [`Error::CyclicValue`] if `value` already holds this value, directly
    /// or through nested containers.
    pub fn set_field(&self, name: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let name = name.into();
        let value = value.into();
        let mut visited = HashSet::new();
        if value
            .typed_children()
            .iter()
            .any(|child| child.reaches(self, &mut visited))
        {
            return Err(Error::CyclicValue { tag: self.tag() });
        }
        let owner = self.as_owner();
        let owner_id = self.identity();
        self.modify(move |data| {
            let tag = data.tag().to_string();
            let fields = data.fields_mut().ok_or(Error::NotContainer { tag })?;
            if let Some(prev) = fields.get(&name) {
                for child in prev.typed_children() {
                    child.remove_parent(owner_id, &name);
                }
            }
            for child in value.typed_children() {
                child.add_parent(owner.clone(), name.clone());
            }
            fields.insert(name, value);
            Ok(())
        })
    }

    /// Whether `target` is this value or nested anywhere below it.
    ///
    /// Records end the walk. Must not be called with a data lock held.
    fn reaches(&self, target: &TypedValue, visited: &mut HashSet<usize>) -> bool {
        if self.ptr_eq(target) {
            return true;
        }
        if !visited.insert(self.identity()) {
            return false;
        }
        let children: Vec<TypedValue> = match self.0.data.lock().fields() {
            Some(fields) => fields.values().flat_map(Value::typed_children).collect(),
            None => return false,
        };
        children.iter().any(|child| child.reaches(target, visited))
    }

    /// Remove a nested field from a container value
    pub fn remove_field(&self, name: &str) -> Result<Option<Value>> {
        let owner_id = self.identity();
        self.modify(|data| {
            let tag = data.tag().to_string();
            let fields = data.fields_mut().ok_or(Error::NotContainer { tag })?;
            let removed = fields.remove(name);
            if let Some(prev) = &removed {
                for child in prev.typed_children() {
                    child.remove_parent(owner_id, name);
                }
            }
            Ok(removed)
        })
    }

    // =========================================================================
    // Parent links
    // =========================================================================

    pub(crate) fn add_parent(&self, owner: Owner, attribute: String) {
        let link = ParentLink { owner, attribute };
        let mut parents = self.0.parents.lock();
        if !parents.iter().any(|existing| existing.same_as(&link)) {
            parents.push(link);
        }
    }

    pub(crate) fn remove_parent(&self, owner_id: usize, attribute: &str) {
        self.0
            .parents
            .lock()
            .retain(|link| !(link.owner.identity() == owner_id && link.attribute == attribute));
    }

    /// Mark every owner currently holding this value as dirty.
    ///
    /// Called automatically by the mutation methods. Stale links are pruned
    /// along the way.
    pub fn notify_dirty(&self) {
        let mut visited = HashSet::new();
        self.notify_inner(&mut visited);
    }

    fn notify_inner(&self, visited: &mut HashSet<usize>) {
        if !visited.insert(self.identity()) {
            return;
        }

        let links = self.0.parents.lock().clone();
        let mut stale = Vec::new();

        for link in &links {
            let state = match &link.owner {
                Owner::Record(weak) => match weak.upgrade() {
                    Some(cell) => RecordCell::child_changed(&cell, &link.attribute, self),
                    None => LinkState::Stale,
                },
                Owner::Value(weak) => match weak.upgrade() {
                    Some(cell) => {
                        let parent = TypedValue(cell);
                        let holds = parent
                            .0
                            .data
                            .lock()
                            .fields()
                            .and_then(|fields| fields.get(&link.attribute))
                            .map_or(false, |v| v.holds(self));
                        if holds {
                            parent.notify_inner(visited);
                            LinkState::Live
                        } else {
                            LinkState::Stale
                        }
                    }
                    None => LinkState::Stale,
                },
            };
            if state == LinkState::Stale {
                stale.push(link.clone());
            }
        }

        if !stale.is_empty() {
            debug!(
                target: "parsel::typed",
                tag = %self.tag(),
                pruned = stale.len(),
                "Pruned stale parent links"
            );
            self.0
                .parents
                .lock()
                .retain(|link| !stale.iter().any(|s| s.same_as(link)));
        }
    }
}

impl PartialEq for TypedValue {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        self.snapshot() == other.snapshot()
    }
}

impl fmt::Debug for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.snapshot();
        f.debug_tuple("TypedValue").field(&data).finish()
    }
}

impl From<GeoPoint> for TypedValue {
    fn from(g: GeoPoint) -> Self {
        TypedValue::new(TypedData::GeoPoint(g))
    }
}

impl From<Date> for TypedValue {
    fn from(d: Date) -> Self {
        TypedValue::new(TypedData::Date(d))
    }
}

impl From<Binary> for TypedValue {
    fn from(b: Binary) -> Self {
        TypedValue::new(TypedData::Bytes(b))
    }
}

impl From<Pointer> for TypedValue {
    fn from(p: Pointer) -> Self {
        TypedValue::new(TypedData::Pointer(p))
    }
}
