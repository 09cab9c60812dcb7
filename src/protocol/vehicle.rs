//! Vehicle and status data model
//!
//! Status records are kept as ordered JSON maps so that flattening follows
//! the document order returned by the vendor API.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Arbitrarily nested status mapping as returned by the vendor API
pub type StatusRecord = Map<String, Value>;

/// Opaque vendor identifier of a vehicle
///
/// The vendor may send the identifier as a number or a string. It is kept as
/// text and only ever echoed back to the API.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VehicleId(String);

impl VehicleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for VehicleId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for VehicleId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(i64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(n) => VehicleId(n.to_string()),
            RawId::Text(s) => VehicleId(s),
        })
    }
}

/// A vehicle of the account fleet, fixed for the lifetime of the process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleRecord {
    pub id: VehicleId,
    pub vin: String,
    #[serde(default)]
    pub is_electric: bool,
    /// Every other attribute the vendor reports (nickname, model, year, ...)
    #[serde(flatten)]
    pub attributes: StatusRecord,
}

impl VehicleRecord {
    pub fn new(id: impl Into<String>, vin: impl Into<String>, is_electric: bool) -> Self {
        Self {
            id: VehicleId::new(id),
            vin: vin.into(),
            is_electric,
            attributes: Map::new(),
        }
    }

    /// Base attributes published once at startup, identity fields first
    pub fn base_attributes(&self) -> StatusRecord {
        let mut record = Map::new();
        record.insert("id".to_string(), Value::String(self.id.to_string()));
        record.insert("vin".to_string(), Value::String(self.vin.clone()));
        record.insert("isElectric".to_string(), Value::Bool(self.is_electric));
        for (key, value) in &self.attributes {
            record.insert(key.clone(), value.clone());
        }
        record
    }
}

/// Find a fleet member by VIN
pub fn find_by_vin<'a>(fleet: &'a [VehicleRecord], vin: &str) -> Option<&'a VehicleRecord> {
    fleet.iter().find(|vehicle| vehicle.vin == vin)
}
