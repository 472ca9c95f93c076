//! Access-control list helpers
//!
//! An ACL maps a principal (a user id, `role:<name>`, or `*` for everyone)
//! to `{"read": true, "write": true}`. It travels under the reserved `ACL`
//! field without a `__type` tag.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::typed::{TypedData, TypedValue, ACL_TAG};
use crate::value::Value;

/// Principal granting access to everyone
pub const PUBLIC_ACCESS: &str = "*";

impl TypedValue {
    /// Grant or revoke read access for a principal
    pub fn set_read_access(&self, principal: &str, allowed: bool) -> Result<()> {
        self.set_permission(principal, "read", allowed)
    }

    /// Grant or revoke write access for a principal
    pub fn set_write_access(&self, principal: &str, allowed: bool) -> Result<()> {
        self.set_permission(principal, "write", allowed)
    }

    /// Whether the principal has read access
    pub fn read_access(&self, principal: &str) -> bool {
        self.permission(principal, "read")
    }

    /// Whether the principal has write access
    pub fn write_access(&self, principal: &str) -> bool {
        self.permission(principal, "write")
    }

    fn permission(&self, principal: &str, kind: &str) -> bool {
        self.field(principal)
            .and_then(|entry| entry.as_object().and_then(|m| m.get(kind)).and_then(Value::as_bool))
            .unwrap_or(false)
    }

    fn set_permission(&self, principal: &str, kind: &str, allowed: bool) -> Result<()> {
        if !matches!(self.snapshot(), TypedData::Acl(_)) {
            return Err(Error::WrongKind {
                name: self.tag(),
                expected: ACL_TAG,
            });
        }

        let mut entry: BTreeMap<String, Value> = self
            .field(principal)
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();
        if allowed {
            entry.insert(kind.to_string(), Value::Bool(true));
        } else {
            entry.remove(kind);
        }

        if entry.is_empty() {
            self.remove_field(principal).map(|_| ())
        } else {
            self.set_field(principal, Value::Object(entry))
        }
    }
}
