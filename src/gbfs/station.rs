//! Station-level schemas for the two required GBFS sub-feeds.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::FeedError;

/// Entry of the `station_information` feed. Everything beyond identity and
/// capacity is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct StationInformation {
    pub station_id: String,
    #[serde(default)]
    pub capacity: u32,
}

/// Entry of the `station_status` feed.
#[derive(Debug, Clone, Deserialize)]
pub struct StationStatus {
    pub station_id: String,
    #[serde(default)]
    pub num_bikes_available: u32,
    #[serde(default)]
    pub num_docks_available: u32,
    #[serde(default, deserialize_with = "flag")]
    pub is_installed: bool,
    #[serde(default, deserialize_with = "flag")]
    pub is_renting: bool,
    #[serde(default, deserialize_with = "flag")]
    pub is_returning: bool,
}

impl StationStatus {
    /// A station counts as active only while it is simultaneously installed,
    /// renting and returning.
    pub fn is_active(&self) -> bool {
        self.is_installed && self.is_renting && self.is_returning
    }
}

pub fn parse_information(doc: &Value) -> Result<Vec<StationInformation>, FeedError> {
    parse_stations(doc, super::STATION_INFORMATION)
}

pub fn parse_status(doc: &Value) -> Result<Vec<StationStatus>, FeedError> {
    parse_stations(doc, super::STATION_STATUS)
}

fn parse_stations<T: DeserializeOwned>(doc: &Value, feed: &str) -> Result<Vec<T>, FeedError> {
    let stations = doc
        .get("data")
        .and_then(|data| data.get("stations"))
        .cloned()
        .ok_or_else(|| FeedError::Schema(format!("{feed}: missing data.stations")))?;

    serde_json::from_value(stations).map_err(|e| FeedError::Schema(format!("{feed}: {e}")))
}

/// GBFS 1.x encodes the status flags as 0/1 integers, 2.x as booleans.
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::Number(n) => Ok(n.as_i64().unwrap_or(0) != 0),
        other => Err(serde::de::Error::custom(format!(
            "expected bool or 0/1, got {other}"
        ))),
    }
}
