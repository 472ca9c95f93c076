//! Routed, credentialed requests with bounded retry
//!
//! [`Client::request`] turns a [`Request`] into an [`HttpRequest`], sends it
//! through the configured [`Transport`] and decodes the JSON body.
//!
//! ## Retry
//!
//! Only transport failures are retried, up to `max_attempts`; the last
//! failure is surfaced as [`Error::Transport`]. A response carrying
//! `{code, error}` is an application error and is returned immediately.

use std::fmt;
use std::sync::Arc;

use parsel_core::{Error, Result};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::credentials::{Credential, CredentialGuard, ScopedCredentials};
use crate::transport::{HttpRequest, HttpResponse, Method, Transport};

/// Header carrying the application id
pub const HEADER_APPLICATION_ID: &str = "X-Parse-Application-Id";
/// Header carrying the REST API key
pub const HEADER_REST_API_KEY: &str = "X-Parse-REST-API-Key";
/// Header carrying the master key
pub const HEADER_MASTER_KEY: &str = "X-Parse-Master-Key";
/// Header carrying a user session token
pub const HEADER_SESSION_TOKEN: &str = "X-Parse-Session-Token";

/// Top-level REST routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// `classes/<className>[/<objectId>]`
    Classes,
    /// `users[/<objectId>]` and `users/me`
    Users,
    /// `login`
    Login,
    /// `logout`
    Logout,
    /// `sessions`
    Sessions,
    /// Cloud functions
    Functions,
    /// Background jobs
    Jobs,
    /// App config
    Config,
    /// Batch operations
    Batch,
    /// Analytics events
    Events,
    /// File uploads
    Files,
    /// Push notifications
    Push,
}

impl Route {
    /// Path segment
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Classes => "classes",
            Route::Users => "users",
            Route::Login => "login",
            Route::Logout => "logout",
            Route::Sessions => "sessions",
            Route::Functions => "functions",
            Route::Jobs => "jobs",
            Route::Config => "config",
            Route::Batch => "batch",
            Route::Events => "events",
            Route::Files => "files",
            Route::Push => "push",
        }
    }
}

/// One logical request to the service
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Route
    pub route: Route,
    /// Class segment (for the `classes` route)
    pub class_name: Option<String>,
    /// Object segment
    pub object_id: Option<String>,
    /// Method
    pub method: Method,
    /// Query parameters
    pub params: Vec<(String, String)>,
    /// JSON body
    pub body: Option<JsonValue>,
    /// Credential for this request only
    pub credential: Option<Credential>,
}

impl Request {
    /// New request with no segments, params or body
    pub fn new(route: Route, method: Method) -> Self {
        Self {
            route,
            class_name: None,
            object_id: None,
            method,
            params: Vec::new(),
            body: None,
            credential: None,
        }
    }

    /// Set the class segment
    pub fn class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    /// Set the object segment
    pub fn object(mut self, object_id: impl Into<String>) -> Self {
        self.object_id = Some(object_id.into());
        self
    }

    /// Add a query parameter
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Set the JSON body
    pub fn body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach a credential for this request only
    pub fn credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    /// `route[/class_name][/object_id]`
    pub fn path(&self) -> String {
        let mut path = self.route.as_str().to_string();
        for segment in [&self.class_name, &self.object_id].into_iter().flatten() {
            path.push('/');
            path.push_str(segment);
        }
        path
    }
}

/// Client for one application on the remote service
pub struct Client {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    scoped: ScopedCredentials,
}

impl Client {
    /// Client over the given transport
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            transport,
            scoped: ScopedCredentials::default(),
        })
    }

    /// Client over HTTP
    #[cfg(feature = "http")]
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let timeout = std::time::Duration::from_millis(config.timeout_ms);
        Self::new(config, Arc::new(crate::http::HttpTransport::new(timeout)))
    }

    /// Configuration in use
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Put `credential` in effect on this thread until the guard drops
    pub fn scoped(&self, credential: Credential) -> CredentialGuard<'_> {
        self.scoped.enter(credential)
    }

    /// Master credential from the configuration, if one is set
    pub fn master_credential(&self) -> Option<Credential> {
        self.config.master_key.clone().map(Credential::Master)
    }

    /// Send a request and decode the response body
    pub fn request(&self, request: &Request) -> Result<JsonValue> {
        let http = self.build(request);
        let attempts = self.config.max_attempts.max(1);

        let mut last_failure = None;
        for attempt in 1..=attempts {
            debug!(
                target: "parsel::client",
                method = %http.method,
                path = %http.path,
                attempt,
                "Sending request"
            );
            match self.transport.send(&http) {
                Ok(response) => return decode_response(response),
                Err(e) => {
                    if attempt < attempts {
                        warn!(
                            target: "parsel::client",
                            path = %http.path,
                            attempt,
                            error = %e,
                            "Request failed, retrying"
                        );
                    }
                    last_failure = Some(e);
                }
            }
        }

        let reason = last_failure.map_or_else(|| "no attempt made".to_string(), |e| e.reason);
        warn!(target: "parsel::client", path = %http.path, attempts, reason = %reason, "Request failed");
        Err(Error::Transport {
            reason: format!("{} (after {} attempts)", reason, attempts),
        })
    }

    fn build(&self, request: &Request) -> HttpRequest {
        let path = request.path();
        let mut headers = vec![
            (HEADER_APPLICATION_ID.to_string(), self.config.application_id.clone()),
            (HEADER_REST_API_KEY.to_string(), self.config.rest_api_key.clone()),
            ("Content-Type".to_string(), "application/json".to_string()),
        ];
        if let Some((name, value)) = self.credential_header(request.credential.as_ref()) {
            headers.push((name.to_string(), value));
        }
        HttpRequest {
            method: request.method,
            url: self.config.url_for(&path),
            path,
            headers,
            query: request.params.clone(),
            body: request.body.as_ref().map(JsonValue::to_string),
        }
    }

    /// Session token wins over any master key; the configured master key is
    /// the fallback.
    fn credential_header(&self, explicit: Option<&Credential>) -> Option<(&'static str, String)> {
        let scoped = self.scoped.current();
        let candidates = [explicit.cloned(), scoped];
        let in_effect = || candidates.iter().flatten();

        if let Some(token) = in_effect().find_map(|c| match c {
            Credential::Session(token) => Some(token.clone()),
            Credential::Master(_) => None,
        }) {
            return Some((HEADER_SESSION_TOKEN, token));
        }
        in_effect()
            .find_map(|c| match c {
                Credential::Master(key) => Some(key.clone()),
                Credential::Session(_) => None,
            })
            .or_else(|| self.config.master_key.clone())
            .map(|key| (HEADER_MASTER_KEY, key))
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("server_url", &self.config.server_url)
            .field("application_id", &self.config.application_id)
            .finish()
    }
}

fn decode_response(response: HttpResponse) -> Result<JsonValue> {
    if response.is_success() {
        if response.body.trim().is_empty() {
            return Ok(JsonValue::Object(Default::default()));
        }
        return serde_json::from_str(&response.body).map_err(|e| Error::Serialization {
            reason: format!("invalid JSON response: {}", e),
        });
    }

    let parsed: Option<JsonValue> = serde_json::from_str(&response.body).ok();
    let code = parsed
        .as_ref()
        .and_then(|body| body.get("code"))
        .and_then(JsonValue::as_i64);
    let message = parsed
        .as_ref()
        .and_then(|body| body.get("error"))
        .and_then(JsonValue::as_str);
    match (code, message) {
        (Some(code), Some(message)) => Err(Error::remote(code, message)),
        _ => Err(Error::Remote {
            code: i64::from(response.status),
            message: response.body,
        }),
    }
}
