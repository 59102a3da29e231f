pub mod battery;
pub mod custody;
pub mod driver;
pub mod error;
pub mod station;
pub mod summary;
pub mod transaction;
pub mod vehicle;

/// Stable entity identifiers. References between entities are always ids
/// resolved through storage, never embedded structs.
pub type BatteryId = i64;
pub type VehicleId = i64;
pub type StationId = i64;
pub type DriverId = i64;
pub type TransactionId = i64;
pub type SummaryId = i64;

// Re-export commonly used types
pub use battery::{Battery, BatteryLocation};
pub use custody::CustodyWorkSet;
pub use driver::Driver;
pub use error::{DomainError, DomainResult};
pub use station::ChargingStation;
pub use summary::{interval_start, summary_interval, DriverSummary, RideDelta};
pub use transaction::{BatteryHistoryEntry, BatteryTransaction, HistoryOwner};
pub use vehicle::Vehicle;
