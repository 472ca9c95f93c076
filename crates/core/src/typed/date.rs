//! Millisecond-precision date value
//!
//! ## Precision
//!
//! The wire format carries exactly three fractional-second digits:
//! `2015-03-01T12:30:45.123Z`. A native clock may carry more; encoding
//! truncates to the millisecond, it never rounds.
//!
//! ## Usage
//!
//! ```
//! use parsel_core::Date;
//!
//! let date = Date::from_iso("2015-03-01T12:30:45.123Z").unwrap();
//! assert_eq!(date.to_iso(), "2015-03-01T12:30:45.123Z");
//! ```

use chrono::{DateTime, Utc};
use serde_json::{json, Value as JsonValue};

use crate::error::{Error, Result};
use crate::wire::JsonMap;

/// Wire layout: `YYYY-MM-DDTHH:MM:SS.sssZ`
const WIRE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";
const WIRE_LEN: usize = 24;

/// A point in time, exchanged with millisecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date(DateTime<Utc>);

impl Date {
    /// Wire tag
    pub const TAG: &'static str = "Date";

    /// Wrap a native timestamp
    pub const fn new(instant: DateTime<Utc>) -> Self {
        Date(instant)
    }

    /// Current moment
    pub fn now() -> Self {
        Date(Utc::now())
    }

    /// Parse an ISO-8601 / RFC 3339 string with a timezone suffix
    pub fn from_iso(iso: &str) -> Result<Self> {
        DateTime::parse_from_rfc3339(iso)
            .map(|d| Date(d.with_timezone(&Utc)))
            .map_err(|e| Error::invalid_wire(format!("invalid ISO-8601 date '{}': {}", iso, e)))
    }

    /// Parse a string only if it has exactly the wire layout.
    ///
    /// Plain strings in responses that look like this (`createdAt`,
    /// `updatedAt`) are dates.
    pub fn parse_wire_str(s: &str) -> Option<Self> {
        let b = s.as_bytes();
        let shaped = b.len() == WIRE_LEN
            && b[4] == b'-'
            && b[7] == b'-'
            && b[10] == b'T'
            && b[13] == b':'
            && b[16] == b':'
            && b[19] == b'.'
            && b[23] == b'Z';
        if !shaped {
            return None;
        }
        Self::from_iso(s).ok()
    }

    /// The native instant, with full precision
    pub fn instant(&self) -> DateTime<Utc> {
        self.0
    }

    /// Wire string, truncated to milliseconds
    pub fn to_iso(&self) -> String {
        self.0.format(WIRE_FORMAT).to_string()
    }

    /// `{"__type":"Date","iso":".."}`
    pub fn to_wire(&self) -> JsonValue {
        json!({"__type": Self::TAG, "iso": self.to_iso()})
    }

    /// Decode from the wire fields (the `__type` key is ignored)
    pub fn from_wire(map: &JsonMap) -> Result<Self> {
        let iso = map
            .get("iso")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| Error::invalid_wire("Date is missing string 'iso'"))?;
        Self::from_iso(iso)
    }
}

impl From<DateTime<Utc>> for Date {
    fn from(instant: DateTime<Utc>) -> Self {
        Date(instant)
    }
}
