//! Storage trait definitions

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Battery, BatteryId, BatteryTransaction, ChargingStation, DomainResult, Driver, DriverId,
    DriverSummary, StationId, SummaryId, TransactionId, Vehicle, VehicleId,
};

/// Storage trait for persistence operations.
///
/// The ledger engine only ever needs load-by-id, a handful of predicate
/// queries, and durable upsert; everything it persists during one submit is
/// written after the cascade has fully succeeded, so a backend wanting hard
/// atomicity can wrap those writes in its own transaction.
#[async_trait]
pub trait Storage: Send + Sync {
    // Battery operations
    async fn save_battery(&self, battery: Battery) -> DomainResult<()>;
    async fn get_battery(&self, id: BatteryId) -> DomainResult<Option<Battery>>;
    async fn list_batteries(&self) -> DomainResult<Vec<Battery>>;

    // Vehicle operations
    async fn save_vehicle(&self, vehicle: Vehicle) -> DomainResult<()>;
    async fn get_vehicle(&self, id: VehicleId) -> DomainResult<Option<Vehicle>>;
    async fn list_vehicles(&self) -> DomainResult<Vec<Vehicle>>;

    // Charging station operations
    async fn save_station(&self, station: ChargingStation) -> DomainResult<()>;
    async fn get_station(&self, id: StationId) -> DomainResult<Option<ChargingStation>>;

    // Driver operations
    async fn save_driver(&self, driver: Driver) -> DomainResult<()>;
    async fn get_driver(&self, id: DriverId) -> DomainResult<Option<Driver>>;
    /// Drivers active at the given instant (started before it, not yet ended)
    async fn active_drivers(&self, as_of: DateTime<Utc>) -> DomainResult<Vec<Driver>>;

    // Transaction operations
    async fn save_transaction(&self, transaction: BatteryTransaction) -> DomainResult<()>;
    async fn get_transaction(&self, id: TransactionId) -> DomainResult<Option<BatteryTransaction>>;
    /// Most recent non-rejected transaction for a driver, optionally only
    /// those strictly before `before`
    async fn latest_transaction_for_driver(
        &self,
        driver: DriverId,
        before: Option<DateTime<Utc>>,
    ) -> DomainResult<Option<BatteryTransaction>>;
    /// Non-rejected transactions for a driver dated at or before `up_to`,
    /// strictly after the `after` cursor in `(date, id)` order, ascending.
    /// The id tie-break keeps same-instant transactions from being skipped
    /// when resuming.
    async fn transactions_in_range(
        &self,
        driver: DriverId,
        after: Option<(DateTime<Utc>, TransactionId)>,
        up_to: DateTime<Utc>,
    ) -> DomainResult<Vec<BatteryTransaction>>;
    /// The conservative cascade superset: non-rejected transactions whose
    /// driver or battery (either side) matches, or whose date is after
    /// `after_date`. Ascending by date.
    async fn transactions_affecting(
        &self,
        driver_ids: &[DriverId],
        battery_ids: &[BatteryId],
        after_date: DateTime<Utc>,
    ) -> DomainResult<Vec<BatteryTransaction>>;
    /// Non-rejected transactions touching a battery on either side,
    /// descending by date
    async fn transactions_for_battery(
        &self,
        battery: BatteryId,
    ) -> DomainResult<Vec<BatteryTransaction>>;

    // Summary operations
    async fn save_summary(&self, summary: DriverSummary) -> DomainResult<()>;
    async fn latest_summary_for_driver(
        &self,
        driver: DriverId,
    ) -> DomainResult<Option<DriverSummary>>;
    /// All summaries for a driver, ascending by start date
    async fn summaries_for_driver(&self, driver: DriverId) -> DomainResult<Vec<DriverSummary>>;
    /// Delete every summary for the driver with `end_date >= cutoff`
    async fn delete_summaries_from(
        &self,
        driver: DriverId,
        cutoff: DateTime<Utc>,
    ) -> DomainResult<()>;

    // Utility
    async fn next_transaction_id(&self) -> TransactionId;
    async fn next_summary_id(&self) -> SummaryId;
}
