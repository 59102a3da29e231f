//! Battery exchange transaction — the ledger's atomic unit

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BatteryId, DriverId, StationId, TransactionId};

/// One battery exchange event.
///
/// `battery_in` is the battery the driver returned to the station,
/// `battery_out` the battery taken out. Either side may be absent (a plain
/// drop-off or a plain pick-up). Records are append-mostly: a superseded
/// transaction is marked `rejected` and kept for audit, never deleted.
///
/// Cross-record references (`correction`, `last_transaction`) are stable ids
/// resolved through storage, so re-linking after a correction is a pure id
/// update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryTransaction {
    /// Unique transaction ID
    pub id: TransactionId,
    /// Driver performing the exchange
    pub driver: DriverId,
    /// Battery returned to the station
    pub battery_in: Option<BatteryId>,
    /// Battery taken out by the driver
    pub battery_out: Option<BatteryId>,
    /// Energy reading of the returned battery (Wh)
    pub battery_in_energy: Option<i32>,
    /// Energy reading of the outgoing battery (Wh)
    pub battery_out_energy: Option<i32>,
    /// Vehicle odometer at the time of the exchange
    pub odometer_reading: i32,
    /// Station where the exchange happened
    pub charging_station: Option<StationId>,
    /// Superseded and excluded from all active derivation
    pub rejected: bool,
    /// The transaction this one supersedes, if this is a correction
    pub correction: Option<TransactionId>,
    /// Prior non-rejected transaction for the same driver, by event date
    pub last_transaction: Option<TransactionId>,
    /// When the exchange physically happened (may differ from `date_added`)
    pub transaction_date: DateTime<Utc>,
    /// When the record was created
    pub date_added: DateTime<Utc>,
}

impl BatteryTransaction {
    /// Distance traveled since the previous exchange, from odometer deltas.
    /// Zero for a driver's first transaction.
    pub fn ride_distance(&self, last: Option<&BatteryTransaction>) -> i32 {
        match last {
            Some(prev) => self.odometer_reading - prev.odometer_reading,
            None => 0,
        }
    }

    /// Energy consumed since the previous exchange: the energy the previous
    /// transaction sent the battery out with, minus the energy it came back
    /// with. Zero when there is no usable previous reading.
    pub fn energy_used(&self, last: Option<&BatteryTransaction>) -> i32 {
        match last.and_then(|prev| prev.battery_out_energy) {
            Some(out_energy) => out_energy - self.battery_in_energy.unwrap_or(0),
            None => 0,
        }
    }

    /// Distance per unit of energy, rounded to 2 decimals. Zero when no
    /// energy was recorded as used.
    pub fn efficiency(&self, last: Option<&BatteryTransaction>) -> f64 {
        let energy = self.energy_used(last);
        if energy > 0 {
            let raw = f64::from(self.ride_distance(last)) / f64::from(energy);
            (raw * 100.0).round() / 100.0
        } else {
            0.0
        }
    }

    /// Charge delta for the outgoing battery while it sat at the station:
    /// the energy it was returned with (previous transaction's `battery_in`
    /// reading) minus the energy it leaves with now.
    pub fn charge_amount(&self, last: Option<&BatteryTransaction>) -> Option<i32> {
        let prev = last?;
        if self.battery_out.is_some() && prev.battery_in.is_some() {
            Some(prev.battery_in_energy.unwrap_or(0) - self.battery_out_energy.unwrap_or(0))
        } else {
            None
        }
    }

    /// Whether this transaction references the given battery on either side
    pub fn touches_battery(&self, battery: BatteryId) -> bool {
        self.battery_in == Some(battery) || self.battery_out == Some(battery)
    }
}

/// Who held a battery at a point in its history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HistoryOwner {
    Station(StationId),
    Driver(DriverId),
}

/// One row of a battery's custody history, as rendered from a transaction.
///
/// An "in" row (battery returned) carries ride figures; an "out" row
/// (battery taken) carries the charge delta from its time at the station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryHistoryEntry {
    pub date: DateTime<Utc>,
    pub owner: Option<HistoryOwner>,
    pub energy: Option<i32>,
    pub ride_distance: Option<i32>,
    pub efficiency: Option<f64>,
    pub charge_amount: Option<i32>,
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn tx(id: TransactionId, date: DateTime<Utc>) -> BatteryTransaction {
        BatteryTransaction {
            id,
            driver: 1,
            battery_in: None,
            battery_out: None,
            battery_in_energy: None,
            battery_out_energy: None,
            odometer_reading: 0,
            charging_station: None,
            rejected: false,
            correction: None,
            last_transaction: None,
            transaction_date: date,
            date_added: date,
        }
    }

    #[test]
    fn first_transaction_has_zero_deltas() {
        let t = tx(1, Utc::now());
        assert_eq!(t.ride_distance(None), 0);
        assert_eq!(t.energy_used(None), 0);
        assert_eq!(t.efficiency(None), 0.0);
    }

    #[test]
    fn ride_distance_from_odometer_delta() {
        let now = Utc::now();
        let mut prev = tx(1, now - Duration::hours(1));
        prev.odometer_reading = 2000;
        let mut t = tx(2, now);
        t.odometer_reading = 2040;
        assert_eq!(t.ride_distance(Some(&prev)), 40);
    }

    #[test]
    fn energy_used_needs_previous_out_reading() {
        let now = Utc::now();
        let mut prev = tx(1, now - Duration::hours(1));
        prev.battery_out_energy = Some(500);
        let mut t = tx(2, now);
        t.battery_in_energy = Some(470);
        assert_eq!(t.energy_used(Some(&prev)), 30);

        prev.battery_out_energy = None;
        assert_eq!(t.energy_used(Some(&prev)), 0);
    }

    #[test]
    fn efficiency_rounds_to_two_decimals() {
        let now = Utc::now();
        let mut prev = tx(1, now - Duration::hours(1));
        prev.odometer_reading = 0;
        prev.battery_out_energy = Some(600);
        let mut t = tx(2, now);
        t.odometer_reading = 40;
        t.battery_in_energy = Some(570);
        // 40 / 30 = 1.333...
        assert_eq!(t.efficiency(Some(&prev)), 1.33);
    }

    #[test]
    fn efficiency_zero_when_no_energy_used() {
        let now = Utc::now();
        let mut t = tx(2, now);
        t.odometer_reading = 40;
        assert_eq!(t.efficiency(None), 0.0);
    }

    #[test]
    fn charge_amount_requires_out_side_and_previous_in() {
        let now = Utc::now();
        let mut prev = tx(1, now - Duration::hours(1));
        prev.battery_in = Some(5);
        prev.battery_in_energy = Some(470);
        let mut t = tx(2, now);
        t.battery_out = Some(5);
        t.battery_out_energy = Some(450);
        assert_eq!(t.charge_amount(Some(&prev)), Some(20));

        t.battery_out = None;
        assert_eq!(t.charge_amount(Some(&prev)), None);
    }

    #[test]
    fn touches_battery_checks_both_sides() {
        let mut t = tx(1, Utc::now());
        t.battery_in = Some(3);
        t.battery_out = Some(4);
        assert!(t.touches_battery(3));
        assert!(t.touches_battery(4));
        assert!(!t.touches_battery(5));
    }
}
