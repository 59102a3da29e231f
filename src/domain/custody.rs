//! Custody projector: maps one transaction onto physical custody state.
//!
//! `apply` and `reverse` are exact inverses over the entities a transaction
//! touches, which is what lets the correction cascade re-derive custody
//! purely by replaying the ledger instead of patching state ad hoc.

use std::collections::HashMap;

use super::{
    Battery, BatteryId, BatteryLocation, BatteryTransaction, Driver, DriverId, Vehicle, VehicleId,
};

/// The bounded set of entities loaded for one cascade.
///
/// Id-keyed arena: the projector mutates copies here; nothing is persisted
/// until the whole cascade has succeeded.
#[derive(Debug, Default, Clone)]
pub struct CustodyWorkSet {
    batteries: HashMap<BatteryId, Battery>,
    vehicles: HashMap<VehicleId, Vehicle>,
    drivers: HashMap<DriverId, Driver>,
}

impl CustodyWorkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_battery(&mut self, battery: Battery) {
        self.batteries.insert(battery.id, battery);
    }

    pub fn insert_vehicle(&mut self, vehicle: Vehicle) {
        self.vehicles.insert(vehicle.id, vehicle);
    }

    pub fn insert_driver(&mut self, driver: Driver) {
        self.drivers.insert(driver.id, driver);
    }

    pub fn battery(&self, id: BatteryId) -> Option<&Battery> {
        self.batteries.get(&id)
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(&id)
    }

    pub fn batteries(&self) -> impl Iterator<Item = &Battery> {
        self.batteries.values()
    }

    pub fn vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// Where a battery is, as far as this work set can see
    pub fn location_of(&self, id: BatteryId) -> BatteryLocation {
        if let Some(station) = self.batteries.get(&id).and_then(|b| b.charging_station) {
            return BatteryLocation::AtStation(station);
        }
        match self.vehicles.values().find(|v| v.battery == Some(id)) {
            Some(v) => BatteryLocation::OnVehicle(v.id),
            None => BatteryLocation::Unassigned,
        }
    }

    fn driver_vehicle_mut(&mut self, driver: DriverId) -> Option<&mut Vehicle> {
        let vehicle_id = self.drivers.get(&driver)?.vehicle;
        self.vehicles.get_mut(&vehicle_id)
    }

    fn detach_from_vehicles(&mut self, battery: BatteryId) {
        for vehicle in self.vehicles.values_mut() {
            if vehicle.battery == Some(battery) {
                vehicle.battery = None;
            }
        }
    }

    /// Apply a transaction's custody effects.
    ///
    /// `battery_in` moves to the transaction's station, leaving whatever
    /// vehicle carried it. `battery_out` leaves its station and lands on the
    /// driver's vehicle. Absent sides and entities missing from the work set
    /// are no-ops.
    pub fn apply(&mut self, txn: &BatteryTransaction) {
        if let Some(bin) = txn.battery_in {
            self.detach_from_vehicles(bin);
            if let Some(battery) = self.batteries.get_mut(&bin) {
                battery.charging_station = txn.charging_station;
            }
        }

        if let Some(bout) = txn.battery_out {
            if let Some(battery) = self.batteries.get_mut(&bout) {
                battery.charging_station = None;
            }
            if let Some(vehicle) = self.driver_vehicle_mut(txn.driver) {
                vehicle.battery = Some(bout);
            }
        }
    }

    /// Undo exactly what [`apply`](Self::apply) did.
    ///
    /// `battery_in` goes back onto the driver's vehicle; `battery_out` goes
    /// back to the transaction's station.
    pub fn reverse(&mut self, txn: &BatteryTransaction) {
        if let Some(bin) = txn.battery_in {
            if let Some(battery) = self.batteries.get_mut(&bin) {
                battery.charging_station = None;
            }
            if let Some(vehicle) = self.driver_vehicle_mut(txn.driver) {
                vehicle.battery = Some(bin);
            }
        }

        if let Some(bout) = txn.battery_out {
            self.detach_from_vehicles(bout);
            if let Some(battery) = self.batteries.get_mut(&bout) {
                battery.charging_station = txn.charging_station;
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────
