//! Client configuration
//!
//! A [`ClientConfig`] is built explicitly (or read from TOML / the
//! environment) and handed to [`crate::Client::new`]. Nothing here is global.

use std::path::Path;

use parsel_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default REST endpoint
pub const DEFAULT_SERVER_URL: &str = "https://api.parse.com/1/";

/// Environment variable holding the application id
pub const ENV_APPLICATION_ID: &str = "PARSE_APPLICATION_ID";
/// Environment variable holding the REST API key
pub const ENV_REST_KEY: &str = "PARSE_REST_KEY";
/// Environment variable holding the optional master key
pub const ENV_MASTER_KEY: &str = "PARSE_MASTER_KEY";
/// Environment variable overriding the server URL
pub const ENV_SERVER_URL: &str = "PARSE_SERVER_URL";

/// Connection settings for the remote service.
///
/// # Example
///
/// ```toml
/// server_url = "https://api.parse.com/1/"
/// application_id = "my-app"
/// rest_api_key = "my-rest-key"
/// # master_key = "my-master-key"   # optional, enables elevated requests
/// # max_attempts = 5                # attempts per request, at least 1
/// # timeout_ms = 10000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Base URL; request paths are appended to it
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Sent as `X-Parse-Application-Id`
    pub application_id: String,
    /// Sent as `X-Parse-REST-API-Key`
    pub rest_api_key: String,
    /// Sent as `X-Parse-Master-Key` when no session token is in effect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_key: Option<String>,
    /// Attempts per request before a transport failure is surfaced
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_max_attempts() -> u32 {
    5
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl ClientConfig {
    /// Config with default URL, attempts and timeout
    pub fn new(application_id: impl Into<String>, rest_api_key: impl Into<String>) -> Self {
        Self {
            server_url: default_server_url(),
            application_id: application_id.into(),
            rest_api_key: rest_api_key.into(),
            master_key: None,
            max_attempts: default_max_attempts(),
            timeout_ms: default_timeout_ms(),
        }
    }

    /// Set the master key
    pub fn with_master_key(mut self, master_key: impl Into<String>) -> Self {
        self.master_key = Some(master_key.into());
        self
    }

    /// Set the server URL
    pub fn with_server_url(mut self, server_url: impl Into<String>) -> Self {
        self.server_url = server_url.into();
        self
    }

    /// Set the attempt cap
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Parse and validate TOML
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ClientConfig = toml::from_str(content).map_err(|e| Error::Config {
            reason: format!("failed to parse config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    /// Build from `PARSE_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |name: &str| {
            lookup(name).ok_or_else(|| Error::Config {
                reason: format!("environment variable {} is not set", name),
            })
        };
        let mut config = Self::new(required(ENV_APPLICATION_ID)?, required(ENV_REST_KEY)?);
        config.master_key = lookup(ENV_MASTER_KEY);
        if let Some(url) = lookup(ENV_SERVER_URL) {
            config.server_url = url;
        }
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config {
            reason: format!("failed to serialize config: {}", e),
        })
    }

    /// Reject empty identifiers and a zero attempt cap
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: &str| {
            Err(Error::Config {
                reason: reason.to_string(),
            })
        };
        if self.application_id.trim().is_empty() {
            return fail("application_id must not be empty");
        }
        if self.rest_api_key.trim().is_empty() {
            return fail("rest_api_key must not be empty");
        }
        if self.server_url.trim().is_empty() {
            return fail("server_url must not be empty");
        }
        if self.max_attempts == 0 {
            return fail("max_attempts must be at least 1");
        }
        Ok(())
    }

    /// `server_url` joined with a relative path
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.server_url.trim_end_matches('/'), path)
    }
}
