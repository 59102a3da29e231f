//! Battery domain entity

use serde::{Deserialize, Serialize};

use super::{BatteryId, StationId, VehicleId};

/// Where a battery physically is right now.
///
/// Derived from custody state, never stored as independent truth: a battery
/// is `AtStation` when its `charging_station` field is set, `OnVehicle` when
/// some vehicle references it, and `Unassigned` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatteryLocation {
    /// Sitting in a charging station slot
    AtStation(StationId),
    /// Mounted on a vehicle
    OnVehicle(VehicleId),
    /// Known to the fleet but currently nowhere (e.g. in repair)
    Unassigned,
}

/// A physical swap battery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Battery {
    /// Unique battery ID
    pub id: BatteryId,
    /// Manufacturer serial number
    pub serial: String,
    /// Capacity in Wh
    pub capacity: i32,
    /// Nominal voltage in V
    pub voltage: i32,
    /// Station currently holding this battery, if any
    pub charging_station: Option<StationId>,
}

impl Battery {
    pub fn new(id: BatteryId, serial: impl Into<String>, capacity: i32, voltage: i32) -> Self {
        Self {
            id,
            serial: serial.into(),
            capacity,
            voltage,
            charging_station: None,
        }
    }

    pub fn at_station(mut self, station: StationId) -> Self {
        self.charging_station = Some(station);
        self
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_battery_is_unplaced() {
        let b = Battery::new(1, "B-123", 2000, 48);
        assert_eq!(b.charging_station, None);
        assert_eq!(b.serial, "B-123");
    }

    #[test]
    fn at_station_sets_slot() {
        let b = Battery::new(1, "B-123", 2000, 48).at_station(7);
        assert_eq!(b.charging_station, Some(7));
    }
}
