//! Vehicle domain entity

use serde::{Deserialize, Serialize};

use super::{BatteryId, VehicleId};

/// A vehicle in the fleet, carrying at most one battery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    /// Unique vehicle ID
    pub id: VehicleId,
    /// Vehicle identification number
    pub vin: String,
    /// Battery currently mounted on this vehicle, if any
    pub battery: Option<BatteryId>,
    /// Last known odometer reading
    pub odometer_reading: i32,
}

impl Vehicle {
    pub fn new(id: VehicleId, vin: impl Into<String>) -> Self {
        Self {
            id,
            vin: vin.into(),
            battery: None,
            odometer_reading: 0,
        }
    }

    pub fn with_battery(mut self, battery: BatteryId) -> Self {
        self.battery = Some(battery);
        self
    }
}
