//! Geographic point value

use serde_json::{json, Value as JsonValue};

use crate::error::{Error, Result};
use crate::wire::{self, JsonMap};

/// Latitude/longitude pair
///
/// Equality is structural: two points at the same coordinates are equal even
/// when they are held by different records.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    /// Degrees north
    pub latitude: f64,
    /// Degrees east
    pub longitude: f64,
}

impl GeoPoint {
    /// Wire tag
    pub const TAG: &'static str = "GeoPoint";

    /// Create a point
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// `{"__type":"GeoPoint","latitude":..,"longitude":..}`
    pub fn to_wire(&self) -> Result<JsonValue> {
        Ok(json!({
            "__type": Self::TAG,
            "latitude": wire::finite_number(self.latitude)?,
            "longitude": wire::finite_number(self.longitude)?,
        }))
    }

    /// Decode from the wire fields (the `__type` key is ignored)
    pub fn from_wire(map: &JsonMap) -> Result<Self> {
        let coordinate = |name: &str| {
            map.get(name).and_then(JsonValue::as_f64).ok_or_else(|| {
                Error::invalid_wire(format!("GeoPoint is missing numeric '{}'", name))
            })
        };
        Ok(Self::new(coordinate("latitude")?, coordinate("longitude")?))
    }
}
