//! Error types for Parsel
//!
//! This module defines every error the object model and the client layer can
//! surface. We use `thiserror` for automatic `Display` and `Error` trait
//! implementations.

use thiserror::Error;

/// Result type alias for Parsel operations
pub type Result<T> = std::result::Result<T, Error>;

/// Remote error code for "object not found"
pub const OBJECT_NOT_FOUND: i64 = 101;

/// Error types for Parsel
///
/// # Categories
///
/// | Category | Variants | Retried |
/// |----------|----------|---------|
/// | Typing | `UnknownType`, `WrongKind`, `NotContainer`, `CyclicValue` | never |
/// | Programmer | `MissingIdentifier`, `AttributeNotFound`, `ProtectedField`, `InvalidQuery`, `CircularReference` | never |
/// | Wire | `InvalidWire`, `IdentifierMismatch`, `Serialization` | never |
/// | Remote | `NotFound`, `Remote` | never |
/// | Transport | `Transport` | by the client, up to the attempt cap |
/// | Setup | `Config` | never |
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    // ==================== Typing ====================
    /// No constructor registered for a type discriminator
    #[error("unknown type: {name}")]
    UnknownType {
        /// The unregistered discriminator
        name: String,
    },

    /// Registered, but not as the kind the caller needed
    #[error("type {name} is not a {expected}")]
    WrongKind {
        /// The registered name
        name: String,
        /// "record class" or "value type"
        expected: &'static str,
    },

    /// Field-level mutation on a typed value that has no fields
    #[error("typed value {tag} has no fields")]
    NotContainer {
        /// Wire tag of the leaf value
        tag: String,
    },

    /// Nested field would make a container value hold itself
    #[error("typed value {tag} cannot contain itself")]
    CyclicValue {
        /// Wire tag of the container
        tag: String,
    },

    // ==================== Programmer Errors ====================
    /// Operation needs a remote identifier the record does not have
    #[error("{class_name} record has no objectId")]
    MissingIdentifier {
        /// Class of the record
        class_name: String,
    },

    /// Field is not held by the record
    #[error("attribute not found: {name}")]
    AttributeNotFound {
        /// Field name
        name: String,
    },

    /// Reserved metadata names cannot be written by the client
    #[error("protected field: {name}")]
    ProtectedField {
        /// Field name
        name: String,
    },

    /// Unsaved records reference each other
    #[error("circular reference between unsaved {class_name} records")]
    CircularReference {
        /// Class of the record seen twice
        class_name: String,
    },

    /// Query builder misuse
    #[error("invalid query: {reason}")]
    InvalidQuery {
        /// What was wrong
        reason: String,
    },

    // ==================== Wire Errors ====================
    /// Payload does not match the wire encoding
    #[error("invalid wire data: {reason}")]
    InvalidWire {
        /// What was wrong
        reason: String,
    },

    /// Response tried to change an assigned id
    #[error("objectId mismatch: expected {expected}, got {actual}")]
    IdentifierMismatch {
        /// Id the record already carries
        expected: String,
        /// Id found in the response
        actual: String,
    },

    /// JSON encode/decode failure
    #[error("serialization error: {reason}")]
    Serialization {
        /// What was wrong
        reason: String,
    },

    // ==================== Remote Errors ====================
    /// The remote store has no such object
    #[error("not found: {message}")]
    NotFound {
        /// Message reported by the server
        message: String,
    },

    /// Remote application error
    #[error("remote error {code}: {message}")]
    Remote {
        /// Numeric error code reported by the server
        code: i64,
        /// Message reported by the server
        message: String,
    },

    // ==================== Transport / Setup ====================
    /// Network-level failure after the final attempt
    #[error("transport error: {reason}")]
    Transport {
        /// Failure of the last attempt
        reason: String,
    },

    /// Configuration could not be loaded or is invalid
    #[error("configuration error: {reason}")]
    Config {
        /// What was wrong
        reason: String,
    },
}

impl Error {
    /// Build the error for a remote `{code, error}` response body.
    ///
    /// Code 101 is mapped to [`Error::NotFound`].
    pub fn remote(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        if code == OBJECT_NOT_FOUND {
            Error::NotFound { message }
        } else {
            Error::Remote { code, message }
        }
    }

    /// Shorthand for [`Error::InvalidWire`]
    pub fn invalid_wire(reason: impl Into<String>) -> Self {
        Error::InvalidWire {
            reason: reason.into(),
        }
    }

    /// Whether the remote store reported the object as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Whether the failure is transient and worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }

    /// Numeric remote code, when the server reported one
    pub fn code(&self) -> Option<i64> {
        match self {
            Error::NotFound { .. } => Some(OBJECT_NOT_FOUND),
            Error::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization {
            reason: e.to_string(),
        }
    }
}
