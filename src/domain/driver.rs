//! Driver domain entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DriverId, VehicleId};

/// A driver with exactly one assigned vehicle.
///
/// Changing vehicles is not supported; custody of batteries taken out by the
/// driver always lands on `vehicle`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    /// Unique driver ID
    pub id: DriverId,
    /// Display name
    pub name: String,
    /// Date the person started driving
    pub date_started: DateTime<Utc>,
    /// Date the person stopped being a driver
    pub date_ended: Option<DateTime<Utc>>,
    /// The vehicle assigned to this driver
    pub vehicle: VehicleId,
}

impl Driver {
    pub fn new(
        id: DriverId,
        name: impl Into<String>,
        date_started: DateTime<Utc>,
        vehicle: VehicleId,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            date_started,
            date_ended: None,
            vehicle,
        }
    }

    /// Whether the driver is actively driving at the given instant
    pub fn is_active(&self, as_of: DateTime<Utc>) -> bool {
        self.date_started < as_of && self.date_ended.map_or(true, |end| end > as_of)
    }
}

// ── Tests ──────────────────────────────────────────────────────
