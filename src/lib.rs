//! Parsel - dirty-tracking object mapper for Parse-style document storage
//!
//! Records are open field maps that remember which fields changed, so a save
//! only sends what is dirty. Structured values (GeoPoint, Date, Bytes,
//! Pointer, ACL and registered custom types) mark their owning records dirty
//! when mutated in place, however deeply they are nested.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use parsel::{Client, ClientConfig, RecordStore, TypeRegistry, TypedValue};
//!
//! let client = Client::connect(ClientConfig::from_env()?)?;
//! let store = RecordStore::new(Arc::new(client), TypeRegistry::global());
//!
//! let city = store.class("City").create();
//! city.set("name", "New York")?;
//! city.set("location", TypedValue::geo_point(40.7, -74.0))?;
//! store.save(&city)?;
//!
//! city.get("location")?.as_typed().unwrap().set_latitude(40.8)?;
//! assert!(city.dirty_keys().contains("location"));
//! ```
//!
//! # Architecture
//!
//! `parsel-core` holds the I/O-free object model and wire codec;
//! `parsel-client` adds configuration, transports, credentials, CRUD and
//! queries. Everything is re-exported here.

pub use parsel_client::*;
pub use parsel_core::{
    is_reserved, Constructor, Fields, JsonMap, ValueDecoder, ACL_TAG, OBJECT_NOT_FOUND,
    RESERVED_FIELDS, USER_PROTECTED,
};
