//! Core object model for Parsel
//!
//! This crate defines the I/O-free half of the object mapper:
//! - Value: attribute values held by record fields
//! - TypedValue: GeoPoint, Date, Bytes, Pointer, ACL and custom tagged values,
//!   with parent links for upward dirty propagation
//! - TypeRegistry: wire discriminator -> constructor
//! - Record / RecordClass: dirty-tracking documents
//! - wire: the tagged-JSON codec
//! - Error: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod record;
pub mod registry;
pub mod typed;
pub mod value;
pub mod wire;

pub use error::{Error, Result, OBJECT_NOT_FOUND};
pub use record::{is_reserved, Record, RecordClass, RESERVED_FIELDS};
pub use registry::{Constructor, TypeRegistry, ValueDecoder, USER_CLASS, USER_PROTECTED};
pub use typed::{Binary, Date, Fields, GeoPoint, Pointer, TypedData, TypedValue, ACL_TAG, PUBLIC_ACCESS};
pub use value::Value;
pub use wire::JsonMap;
