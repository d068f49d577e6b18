use serde::{Deserialize, Serialize};

#[cfg(feature = "sqlite")]
use sqlx::FromRow;

/// One decoded value from one acquisition cycle.
///
/// `index` is the position of the parameter in the configured table, so a
/// batch with skipped parameters keeps the original numbering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterReading {
    pub index: usize,
    pub name: String,
    pub value: f64,
    pub unit: String,
}

impl MeterReading {
    pub fn new(index: usize, name: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            value,
            unit: unit.into(),
        }
    }
}

/// A persisted batch: the readings of one cycle serialized as a JSON array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlite", derive(FromRow))]
pub struct MeterDataRecord {
    pub id: i64,
    pub unix_timestamp: i64,
    pub device_id: String,
    pub json_data: String,
}

impl MeterDataRecord {
    pub fn readings(&self) -> Result<Vec<MeterReading>, serde_json::Error> {
        serde_json::from_str(&self.json_data)
    }
}
