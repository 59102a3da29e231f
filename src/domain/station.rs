//! Charging station domain entity

use serde::{Deserialize, Serialize};

use super::StationId;

/// A swap station where batteries are dropped off and charged.
///
/// Stations hold batteries implicitly: a battery is at a station when its
/// `charging_station` field points here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingStation {
    /// Unique station ID
    pub id: StationId,
    /// Human-readable station name
    pub name: String,
    /// Free-form location description
    pub location: Option<String>,
}

impl ChargingStation {
    pub fn new(id: StationId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            location: None,
        }
    }
}
