//! CRUD operations on records
//!
//! [`RecordStore`] ties a [`Client`] to a [`TypeRegistry`] and moves records
//! between memory and the remote service.
//!
//! ## Save
//!
//! - unsaved record: `POST`, assigns id and timestamps, marks it loaded
//! - saved record: `PUT` with only the dirty fields; nothing is sent when no
//!   field is dirty
//! - records held in fields are saved first when they have no id, so a
//!   Pointer can be built; unsaved records referring to each other fail with
//!   [`Error::CircularReference`]
//!
//! A failed save leaves the record untouched, including its dirty set.

use std::sync::Arc;

use parsel_core::wire::{self, JsonMap};
use parsel_core::{Error, Pointer, Record, RecordClass, Result, TypeRegistry, Value, USER_CLASS};
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::client::{Client, Request, Route};
use crate::credentials::Credential;
use crate::transport::Method;

/// Field carrying a user's session token
pub const SESSION_TOKEN_FIELD: &str = "sessionToken";

/// Record persistence over a client
#[derive(Debug, Clone)]
pub struct RecordStore {
    client: Arc<Client>,
    registry: Arc<TypeRegistry>,
}

impl RecordStore {
    /// Store using `registry` to decode responses
    pub fn new(client: Arc<Client>, registry: Arc<TypeRegistry>) -> Self {
        Self { client, registry }
    }

    /// Client in use
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Registry in use
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Register (or look up) a record class by name
    pub fn class(&self, name: &str) -> RecordClass {
        self.registry.register_class(name)
    }

    /// Read a record by id
    ///
    /// Fails with [`Error::NotFound`] when the service has no such object.
    pub fn get(&self, class_name: &str, object_id: &str) -> Result<Record> {
        let class = self.registry.resolve_class(class_name)?;
        let record = Record::unfetched(class, object_id);
        self.fetch(&record)?;
        Ok(record)
    }

    /// Replace the record's fields with the remote copy
    pub fn fetch(&self, record: &Record) -> Result<()> {
        let id = require_id(record)?;
        let request = endpoint(record.class_name(), Some(&id), Method::Get)
            .credential(session_of(record));
        let response = self.client.request(&request)?;
        record.refresh(&self.registry, as_payload(&response)?)?;
        debug!(target: "parsel::store", class = record.class_name(), id = %id, "Fetched record");
        Ok(())
    }

    /// Create or update the record
    pub fn save(&self, record: &Record) -> Result<()> {
        let mut in_flight = Vec::new();
        self.save_tracked(record, &mut in_flight)
    }

    /// Remove the record from the service.
    ///
    /// Local fields and the id are kept; later remote operations on the id
    /// fail with [`Error::NotFound`].
    pub fn delete(&self, record: &Record) -> Result<()> {
        let id = require_id(record)?;
        let request = endpoint(record.class_name(), Some(&id), Method::Delete)
            .credential(session_of(record));
        self.client.request(&request)?;
        record.mark_deleted();
        info!(target: "parsel::store", class = record.class_name(), id = %id, "Deleted record");
        Ok(())
    }

    /// Pointer to the record, saving it first if it has no id
    pub fn to_pointer(&self, record: &Record) -> Result<Pointer> {
        let mut in_flight = Vec::new();
        self.pointer_tracked(record, &mut in_flight)
    }

    fn save_tracked(&self, record: &Record, in_flight: &mut Vec<Record>) -> Result<()> {
        if in_flight.iter().any(|r| r.ptr_eq(record)) {
            return Err(Error::CircularReference {
                class_name: record.class_name().to_string(),
            });
        }
        let id = record.id();
        // A deleted record always reaches the service so the missing id surfaces
        if id.is_some() && !record.is_dirty() && !record.is_deleted() {
            debug!(target: "parsel::store", class = record.class_name(), "Nothing to save");
            return Ok(());
        }

        in_flight.push(record.clone());
        let result = self.send_save(record, id.as_deref(), in_flight);
        in_flight.pop();
        result
    }

    fn send_save(&self, record: &Record, id: Option<&str>, in_flight: &mut Vec<Record>) -> Result<()> {
        let body = record.marshal_dirty(&mut |nested: &Record| self.pointer_tracked(nested, in_flight))?;
        let method = if id.is_some() { Method::Put } else { Method::Post };
        let request = endpoint(record.class_name(), id, method)
            .body(JsonValue::Object(body))
            .credential(session_of(record));

        let response = self.client.request(&request)?;
        record.apply_save(&self.registry, as_payload(&response)?)?;
        info!(
            target: "parsel::store",
            class = record.class_name(),
            id = ?record.id(),
            created = id.is_none(),
            "Saved record"
        );
        Ok(())
    }

    fn pointer_tracked(&self, record: &Record, in_flight: &mut Vec<Record>) -> Result<Pointer> {
        if record.id().is_none() {
            self.save_tracked(record, in_flight)?;
        }
        wire::existing_pointer(record)
    }
}

/// Request for a class, or one of its objects
pub(crate) fn endpoint(class_name: &str, object_id: Option<&str>, method: Method) -> Request {
    let request = if class_name == USER_CLASS {
        Request::new(Route::Users, method)
    } else {
        Request::new(Route::Classes, method).class(class_name)
    };
    match object_id {
        Some(id) => request.object(id),
        None => request,
    }
}

/// A user record acts with its own session
pub(crate) fn session_of(record: &Record) -> Option<Credential> {
    if record.class_name() != USER_CLASS {
        return None;
    }
    match record.try_get(SESSION_TOKEN_FIELD) {
        Some(Value::String(token)) => Some(Credential::Session(token)),
        _ => None,
    }
}

pub(crate) fn as_payload(response: &JsonValue) -> Result<&JsonMap> {
    response
        .as_object()
        .ok_or_else(|| Error::invalid_wire("response body is not a JSON object"))
}

fn require_id(record: &Record) -> Result<String> {
    record.id().ok_or_else(|| Error::MissingIdentifier {
        class_name: record.class_name().to_string(),
    })
}
