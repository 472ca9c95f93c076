//! Client layer for Parsel
//!
//! Moves records between memory and a Parse-style REST service:
//! - ClientConfig: connection settings (TOML or environment)
//! - Transport: pluggable request sender (`HttpTransport`, `MemoryTransport`)
//! - Client: routing, headers, scoped credentials and bounded retry
//! - RecordStore: get / fetch / save / delete, users and sessions
//! - Query / QuerySet: filtered, sorted and paged reads

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod credentials;
#[cfg(feature = "http")]
pub mod http;
pub mod memory;
pub mod query;
pub mod store;
pub mod transport;
mod user;

pub use client::{Client, Request, Route};
pub use config::ClientConfig;
pub use credentials::{Credential, CredentialGuard};
#[cfg(feature = "http")]
pub use http::HttpTransport;
pub use memory::MemoryTransport;
pub use query::{Query, QuerySet};
pub use store::RecordStore;
pub use transport::{HttpRequest, HttpResponse, Method, Transport, TransportError};

pub use parsel_core::{
    wire, Binary, Date, Error, GeoPoint, Pointer, Record, RecordClass, Result, TypeRegistry,
    TypedData, TypedValue, Value, PUBLIC_ACCESS, USER_CLASS,
};
