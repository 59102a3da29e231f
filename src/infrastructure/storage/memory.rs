//! In-memory storage implementation

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::Storage;
use crate::domain::{
    Battery, BatteryId, BatteryTransaction, ChargingStation, DomainResult, Driver, DriverId,
    DriverSummary, StationId, SummaryId, TransactionId, Vehicle, VehicleId,
};

/// In-memory storage for development and testing
pub struct InMemoryStorage {
    batteries: DashMap<BatteryId, Battery>,
    vehicles: DashMap<VehicleId, Vehicle>,
    stations: DashMap<StationId, ChargingStation>,
    drivers: DashMap<DriverId, Driver>,
    transactions: DashMap<TransactionId, BatteryTransaction>,
    summaries: DashMap<SummaryId, DriverSummary>,
    transaction_counter: AtomicI64,
    summary_counter: AtomicI64,
}

fn ascending(mut txns: Vec<BatteryTransaction>) -> Vec<BatteryTransaction> {
    txns.sort_by_key(|t| (t.transaction_date, t.id));
    txns
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            batteries: DashMap::new(),
            vehicles: DashMap::new(),
            stations: DashMap::new(),
            drivers: DashMap::new(),
            transactions: DashMap::new(),
            summaries: DashMap::new(),
            transaction_counter: AtomicI64::new(1),
            summary_counter: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn save_battery(&self, battery: Battery) -> DomainResult<()> {
        self.batteries.insert(battery.id, battery);
        Ok(())
    }

    async fn get_battery(&self, id: BatteryId) -> DomainResult<Option<Battery>> {
        Ok(self.batteries.get(&id).map(|b| b.clone()))
    }

    async fn list_batteries(&self) -> DomainResult<Vec<Battery>> {
        Ok(self.batteries.iter().map(|e| e.value().clone()).collect())
    }

    async fn save_vehicle(&self, vehicle: Vehicle) -> DomainResult<()> {
        self.vehicles.insert(vehicle.id, vehicle);
        Ok(())
    }

    async fn get_vehicle(&self, id: VehicleId) -> DomainResult<Option<Vehicle>> {
        Ok(self.vehicles.get(&id).map(|v| v.clone()))
    }

    async fn list_vehicles(&self) -> DomainResult<Vec<Vehicle>> {
        Ok(self.vehicles.iter().map(|e| e.value().clone()).collect())
    }

    async fn save_station(&self, station: ChargingStation) -> DomainResult<()> {
        self.stations.insert(station.id, station);
        Ok(())
    }

    async fn get_station(&self, id: StationId) -> DomainResult<Option<ChargingStation>> {
        Ok(self.stations.get(&id).map(|s| s.clone()))
    }

    async fn save_driver(&self, driver: Driver) -> DomainResult<()> {
        self.drivers.insert(driver.id, driver);
        Ok(())
    }

    async fn get_driver(&self, id: DriverId) -> DomainResult<Option<Driver>> {
        Ok(self.drivers.get(&id).map(|d| d.clone()))
    }

    async fn active_drivers(&self, as_of: DateTime<Utc>) -> DomainResult<Vec<Driver>> {
        Ok(self
            .drivers
            .iter()
            .filter(|d| d.is_active(as_of))
            .map(|d| d.clone())
            .collect())
    }

    async fn save_transaction(&self, transaction: BatteryTransaction) -> DomainResult<()> {
        self.transactions.insert(transaction.id, transaction);
        Ok(())
    }

    async fn get_transaction(&self, id: TransactionId) -> DomainResult<Option<BatteryTransaction>> {
        Ok(self.transactions.get(&id).map(|t| t.clone()))
    }

    async fn latest_transaction_for_driver(
        &self,
        driver: DriverId,
        before: Option<DateTime<Utc>>,
    ) -> DomainResult<Option<BatteryTransaction>> {
        Ok(self
            .transactions
            .iter()
            .filter(|t| !t.rejected && t.driver == driver)
            .filter(|t| before.map_or(true, |cutoff| t.transaction_date < cutoff))
            .max_by_key(|t| (t.transaction_date, t.id))
            .map(|t| t.clone()))
    }

    async fn transactions_in_range(
        &self,
        driver: DriverId,
        after: Option<(DateTime<Utc>, TransactionId)>,
        up_to: DateTime<Utc>,
    ) -> DomainResult<Vec<BatteryTransaction>> {
        let txns = self
            .transactions
            .iter()
            .filter(|t| !t.rejected && t.driver == driver)
            .filter(|t| after.map_or(true, |lower| (t.transaction_date, t.id) > lower))
            .filter(|t| t.transaction_date <= up_to)
            .map(|t| t.clone())
            .collect();
        Ok(ascending(txns))
    }

    async fn transactions_affecting(
        &self,
        driver_ids: &[DriverId],
        battery_ids: &[BatteryId],
        after_date: DateTime<Utc>,
    ) -> DomainResult<Vec<BatteryTransaction>> {
        let txns = self
            .transactions
            .iter()
            .filter(|t| !t.rejected)
            .filter(|t| {
                driver_ids.contains(&t.driver)
                    || battery_ids.iter().any(|b| t.touches_battery(*b))
                    || t.transaction_date > after_date
            })
            .map(|t| t.clone())
            .collect();
        Ok(ascending(txns))
    }

    async fn transactions_for_battery(
        &self,
        battery: BatteryId,
    ) -> DomainResult<Vec<BatteryTransaction>> {
        let mut txns = ascending(
            self.transactions
                .iter()
                .filter(|t| !t.rejected && t.touches_battery(battery))
                .map(|t| t.clone())
                .collect(),
        );
        txns.reverse();
        Ok(txns)
    }

    async fn save_summary(&self, summary: DriverSummary) -> DomainResult<()> {
        self.summaries.insert(summary.id, summary);
        Ok(())
    }

    async fn latest_summary_for_driver(
        &self,
        driver: DriverId,
    ) -> DomainResult<Option<DriverSummary>> {
        Ok(self
            .summaries
            .iter()
            .filter(|s| s.driver == driver)
            .max_by_key(|s| s.start_date)
            .map(|s| s.clone()))
    }

    async fn summaries_for_driver(&self, driver: DriverId) -> DomainResult<Vec<DriverSummary>> {
        let mut out: Vec<DriverSummary> = self
            .summaries
            .iter()
            .filter(|s| s.driver == driver)
            .map(|s| s.clone())
            .collect();
        out.sort_by_key(|s| s.start_date);
        Ok(out)
    }

    async fn delete_summaries_from(
        &self,
        driver: DriverId,
        cutoff: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.summaries
            .retain(|_, s| !(s.driver == driver && s.end_date >= cutoff));
        Ok(())
    }

    async fn next_transaction_id(&self) -> TransactionId {
        self.transaction_counter.fetch_add(1, Ordering::SeqCst)
    }

    async fn next_summary_id(&self) -> SummaryId {
        self.summary_counter.fetch_add(1, Ordering::SeqCst)
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn txn(id: TransactionId, driver: DriverId, date: DateTime<Utc>) -> BatteryTransaction {
        BatteryTransaction {
            id,
            driver,
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

    #[tokio::test]
    async fn latest_for_driver_respects_cutoff_and_rejection() {
        let storage = InMemoryStorage::new();
        let now = Utc::now();

        let t1 = txn(1, 1, now - Duration::hours(3));
        let mut t2 = txn(2, 1, now - Duration::hours(2));
        let t3 = txn(3, 1, now - Duration::hours(1));
        t2.rejected = true;

        for t in [t1, t2, t3] {
            storage.save_transaction(t).await.unwrap();
        }

        let latest = storage.latest_transaction_for_driver(1, None).await.unwrap();
        assert_eq!(latest.map(|t| t.id), Some(3));

        // strictly-before cutoff skips t3; rejected t2 never counts
        let latest = storage
            .latest_transaction_for_driver(1, Some(now - Duration::hours(1)))
            .await
            .unwrap();
        assert_eq!(latest.map(|t| t.id), Some(1));
    }

    #[tokio::test]
    async fn affecting_query_is_a_superset() {
        let storage = InMemoryStorage::new();
        let now = Utc::now();

        // same driver, old date
        storage.save_transaction(txn(1, 1, now - Duration::days(2))).await.unwrap();
        // other driver touching the battery, earlier still
        let mut t2 = txn(2, 2, now - Duration::days(2) - Duration::hours(1));
        t2.battery_out = Some(7);
        storage.save_transaction(t2).await.unwrap();
        // unrelated but later
        storage.save_transaction(txn(3, 3, now + Duration::hours(1))).await.unwrap();
        // unrelated and earlier
        storage.save_transaction(txn(4, 3, now - Duration::days(3))).await.unwrap();

        let affected = storage.transactions_affecting(&[1], &[7], now).await.unwrap();
        let ids: Vec<_> = affected.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[tokio::test]
    async fn battery_history_is_descending() {
        let storage = InMemoryStorage::new();
        let now = Utc::now();

        let mut t1 = txn(1, 1, now - Duration::hours(2));
        t1.battery_out = Some(5);
        let mut t2 = txn(2, 1, now - Duration::hours(1));
        t2.battery_in = Some(5);
        storage.save_transaction(t1).await.unwrap();
        storage.save_transaction(t2).await.unwrap();

        let history = storage.transactions_for_battery(5).await.unwrap();
        let ids: Vec<_> = history.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn delete_summaries_from_cutoff() {
        let storage = InMemoryStorage::new();
        let start = interval_start_for_test();

        let first = DriverSummary::bootstrap(1, 1, start);
        let second = DriverSummary::following(2, &first);
        storage.save_summary(first.clone()).await.unwrap();
        storage.save_summary(second.clone()).await.unwrap();

        // cutoff inside the second interval: first ends before it and survives
        storage
            .delete_summaries_from(1, second.end_date)
            .await
            .unwrap();

        let left = storage.summaries_for_driver(1).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, 1);
    }

    fn interval_start_for_test() -> DateTime<Utc> {
        crate::domain::interval_start(Utc::now())
    }
}
