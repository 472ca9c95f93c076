//! Transport abstraction
//!
//! The client builds fully-formed [`HttpRequest`]s (URL, headers, query,
//! body) and hands them to a [`Transport`]. A transport only reports
//! network-level failures as errors; any HTTP response, including error
//! statuses, comes back as an [`HttpResponse`] for the client to decode.

use std::fmt;

use thiserror::Error;

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
}

impl Method {
    /// Upper-case method name
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request as it goes over the wire
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Method
    pub method: Method,
    /// Absolute URL without query string
    pub url: String,
    /// Path relative to the server URL (e.g. `classes/City/abc`)
    pub path: String,
    /// Header name/value pairs
    pub headers: Vec<(String, String)>,
    /// Query parameters, values already JSON-encoded where needed
    pub query: Vec<(String, String)>,
    /// JSON body
    pub body: Option<String>,
}

impl HttpRequest {
    /// Value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Value of a query parameter
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Response status and raw body
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Raw body
    pub body: String,
}

impl HttpResponse {
    /// Response with a JSON body
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network-level failure (connection refused, timeout, ...)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct TransportError {
    /// What went wrong
    pub reason: String,
}

impl TransportError {
    /// New transport error
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Sends requests to the remote service
pub trait Transport: Send + Sync {
    /// Send one request; never retries
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}
