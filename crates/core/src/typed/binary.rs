//! Base64-carried binary value

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{json, Value as JsonValue};

use crate::error::{Error, Result};
use crate::wire::JsonMap;

/// Binary blob exchanged as base64
///
/// Keeps the encoded string it was built from and re-emits it verbatim, so a
/// value read from the server goes back byte-for-byte identical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binary {
    encoded: String,
    decoded: Vec<u8>,
}

impl Binary {
    /// Wire tag
    pub const TAG: &'static str = "Bytes";

    /// Build from a base64 string
    pub fn from_base64(encoded: impl Into<String>) -> Result<Self> {
        let encoded = encoded.into();
        let decoded = BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| Error::invalid_wire(format!("invalid base64: {}", e)))?;
        Ok(Self { encoded, decoded })
    }

    /// Build from raw bytes
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let decoded = bytes.into();
        Self {
            encoded: BASE64.encode(&decoded),
            decoded,
        }
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.decoded
    }

    /// The base64 string as received or produced
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// `{"__type":"Bytes","base64":".."}`
    pub fn to_wire(&self) -> JsonValue {
        json!({"__type": Self::TAG, "base64": self.encoded})
    }

    /// Decode from the wire fields (the `__type` key is ignored)
    pub fn from_wire(map: &JsonMap) -> Result<Self> {
        let encoded = map
            .get("base64")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| Error::invalid_wire("Bytes is missing string 'base64'"))?;
        Self::from_base64(encoded)
    }
}
