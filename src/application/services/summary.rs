//! Summary rollover engine.
//!
//! Incrementally extends per-driver, fixed-interval usage summaries to a
//! target date, and rebuilds them wholesale when a correction or backdated
//! transaction invalidates history. Summaries carry cumulative totals, so an
//! invalidated range is never patched in place.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::domain::{
    summary_interval, BatteryTransaction, DomainError, DomainResult, Driver, DriverSummary,
    RideDelta,
};
use crate::infrastructure::Storage;

/// Walk forward one interval at a time from the current summary, draining
/// pending deltas into whichever interval covers them.
///
/// Pure fold over precomputed deltas; `rollover` prepares its inputs. Deltas
/// must be ascending by date and not yet applied to any summary. Freshly
/// created summaries get id 0; the caller assigns real ids when persisting.
///
/// Every interval up to `end_date` is produced, including empty ones, and
/// the walk keeps going past `end_date` while deltas remain, so a
/// transaction dated exactly on the requested boundary still lands in a
/// summary.
pub fn rollover_fold(
    driver: &Driver,
    end_date: DateTime<Utc>,
    last_summary: Option<DriverSummary>,
    deltas: Vec<RideDelta>,
) -> Vec<DriverSummary> {
    let mut pending = VecDeque::from(deltas);

    let mut current =
        last_summary.unwrap_or_else(|| DriverSummary::bootstrap(0, driver.id, driver.date_started));
    let mut current_date = current.start_date;
    let mut result = Vec::new();

    while current_date < end_date || !pending.is_empty() {
        if current.end_date <= current_date {
            current = DriverSummary::following(0, &current);
        }
        while pending.front().map_or(false, |d| d.date < current.end_date) {
            // drain is guarded by front(), so the unwrap cannot fire
            let delta = pending.pop_front().unwrap();
            current.apply_delta(&delta);
        }
        result.push(current.clone());
        current_date += summary_interval();
    }

    result
}

/// Service owning the per-driver summary sequences
pub struct SummaryService {
    storage: Arc<dyn Storage>,
}

impl SummaryService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Resolve a transaction's usage deltas against its chain predecessor
    async fn delta_for(&self, txn: &BatteryTransaction) -> DomainResult<RideDelta> {
        let last = match txn.last_transaction {
            Some(prev_id) => {
                let prev = self.storage.get_transaction(prev_id).await?.ok_or_else(|| {
                    DomainError::InconsistentChain(format!(
                        "transaction {} links to missing transaction {}",
                        txn.id, prev_id
                    ))
                })?;
                if prev.rejected {
                    return Err(DomainError::InconsistentChain(format!(
                        "transaction {} links to rejected transaction {}",
                        txn.id, prev_id
                    )));
                }
                Some(prev)
            }
            None => None,
        };

        Ok(RideDelta {
            transaction: txn.id,
            date: txn.transaction_date,
            ride_distance: txn.ride_distance(last.as_ref()),
            energy_used: txn.energy_used(last.as_ref()),
        })
    }

    /// Extend the driver's summaries up to and including `end_date`.
    ///
    /// Resumes from the latest existing summary (everything up to its
    /// `last_transaction` has already been folded in) or bootstraps a first
    /// summary at the midnight before the driver's start date. Returns the
    /// summaries that were written.
    pub async fn rollover(
        &self,
        driver: &Driver,
        end_date: DateTime<Utc>,
    ) -> DomainResult<Vec<DriverSummary>> {
        let last_summary = self.storage.latest_summary_for_driver(driver.id).await?;

        // resume cursor tie-breaks on id so a second transaction sharing the
        // exact same instant is still picked up
        let after = match &last_summary {
            Some(summary) => Some(match summary.last_transaction {
                Some(txn_id) => {
                    let applied =
                        self.storage.get_transaction(txn_id).await?.ok_or_else(|| {
                            DomainError::InconsistentChain(format!(
                                "summary {} links to missing transaction {}",
                                summary.id, txn_id
                            ))
                        })?;
                    (applied.transaction_date, applied.id)
                }
                None => (summary.start_date, 0),
            }),
            None => None,
        };

        let transactions = self
            .storage
            .transactions_in_range(driver.id, after, end_date)
            .await?;

        let mut deltas = Vec::with_capacity(transactions.len());
        for txn in &transactions {
            deltas.push(self.delta_for(txn).await?);
        }

        let mut summaries = rollover_fold(driver, end_date, last_summary, deltas);
        for summary in &mut summaries {
            if summary.id == 0 {
                summary.id = self.storage.next_summary_id().await;
            }
            self.storage.save_summary(summary.clone()).await?;
        }

        debug!(
            driver = driver.id,
            count = summaries.len(),
            "rolled over summaries up to {}",
            end_date
        );
        Ok(summaries)
    }

    /// Throw away every summary from `start_date` onward and regenerate up
    /// to `end_date`. Cumulative totals make partial patching unsound, so
    /// invalidated history is always rebuilt from scratch.
    pub async fn rebuild(
        &self,
        driver: &Driver,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> DomainResult<Vec<DriverSummary>> {
        self.storage
            .delete_summaries_from(driver.id, start_date)
            .await?;
        self.rollover(driver, end_date).await
    }

    /// Roll over every currently-active driver to `now`. One driver's
    /// failure does not abort the rest. Returns how many drivers rolled
    /// over successfully.
    pub async fn rollover_all(&self, now: DateTime<Utc>) -> DomainResult<usize> {
        let drivers = self.storage.active_drivers(now).await?;
        let mut succeeded = 0;

        for driver in &drivers {
            match self.rollover(driver, now).await {
                Ok(_) => succeeded += 1,
                Err(e) => {
                    warn!(driver = driver.id, "summary rollover failed: {}", e);
                }
            }
        }

        Ok(succeeded)
    }

    /// Bring summaries in line with a freshly inserted transaction.
    ///
    /// A correction invalidates everything from the superseded event's date
    /// for both affected drivers; a backdated transaction invalidates from
    /// its own date; anything else is a plain incremental rollover.
    pub async fn update_summaries(
        &self,
        transaction: &BatteryTransaction,
        correction: Option<&BatteryTransaction>,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<DriverSummary>> {
        let driver = self
            .storage
            .get_driver(transaction.driver)
            .await?
            .ok_or(DomainError::InvalidReference {
                entity: "driver",
                id: transaction.driver,
            })?;

        if let Some(corrected) = correction {
            let mut summaries = self
                .rebuild(&driver, corrected.transaction_date, now)
                .await?;
            if corrected.driver != transaction.driver {
                let other = self.storage.get_driver(corrected.driver).await?.ok_or(
                    DomainError::InvalidReference {
                        entity: "driver",
                        id: corrected.driver,
                    },
                )?;
                summaries.extend(
                    self.rebuild(&other, corrected.transaction_date, now)
                        .await?,
                );
            }
            return Ok(summaries);
        }

        if self.is_backdated(transaction).await? {
            return self
                .rebuild(&driver, transaction.transaction_date, now)
                .await;
        }

        self.rollover(&driver, transaction.transaction_date).await
    }

    /// Whether the transaction predates work already folded into summaries
    async fn is_backdated(&self, transaction: &BatteryTransaction) -> DomainResult<bool> {
        let last_summary = match self
            .storage
            .latest_summary_for_driver(transaction.driver)
            .await?
        {
            Some(s) => s,
            None => return Ok(false),
        };
        let applied_up_to = match last_summary.last_transaction {
            Some(txn_id) => match self.storage.get_transaction(txn_id).await? {
                Some(txn) => txn.transaction_date,
                None => return Ok(false),
            },
            None => last_summary.start_date,
        };
        Ok(transaction.transaction_date < applied_up_to)
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    use crate::domain::{DriverId, TransactionId};
    use crate::infrastructure::InMemoryStorage;

    fn day0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn txn(
        id: TransactionId,
        driver: DriverId,
        date: DateTime<Utc>,
    ) -> BatteryTransaction {
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

    /// The worked scenario: swap on day 0, nothing on day 1, drop-off on
    /// day 2. Expect 40/30, 0/0, 40/30 with cumulatives 80/60.
    async fn seed_three_day_history(storage: &InMemoryStorage) -> Driver {
        let driver = Driver::new(1, "Ozias", day0(), 1);
        storage.save_driver(driver.clone()).await.unwrap();

        let mut t1 = txn(1, 1, day0() + Duration::hours(1));
        t1.battery_out = Some(1);
        t1.battery_out_energy = Some(500);
        t1.odometer_reading = 2000;

        let mut t2 = txn(2, 1, day0() + Duration::hours(2));
        t2.battery_in = Some(1);
        t2.battery_out = Some(2);
        t2.battery_in_energy = Some(470);
        t2.battery_out_energy = Some(600);
        t2.odometer_reading = 2040;
        t2.last_transaction = Some(1);

        let mut t3 = txn(3, 1, day0() + Duration::days(2) + Duration::hours(1));
        t3.battery_in = Some(2);
        t3.battery_in_energy = Some(570);
        t3.odometer_reading = 2080;
        t3.last_transaction = Some(2);

        for t in [t1, t2, t3] {
            storage.save_transaction(t).await.unwrap();
        }
        driver
    }

    #[tokio::test]
    async fn rollover_three_day_scenario() {
        let storage = Arc::new(InMemoryStorage::new());
        let driver = seed_three_day_history(&storage).await;
        let service = SummaryService::new(storage.clone());

        let summaries = service
            .rollover(&driver, day0() + Duration::days(2) + Duration::hours(2))
            .await
            .unwrap();

        assert_eq!(summaries.len(), 3);

        assert_eq!(summaries[0].ride_distance, 40);
        assert_eq!(summaries[0].energy_used, 30);
        assert_eq!(summaries[1].ride_distance, 0);
        assert_eq!(summaries[1].energy_used, 0);
        assert_eq!(summaries[2].ride_distance, 40);
        assert_eq!(summaries[2].energy_used, 30);

        assert_eq!(summaries[2].cumulative_ride_distance, 80);
        assert_eq!(summaries[2].cumulative_energy_used, 60);
        assert_eq!(summaries[2].last_transaction, Some(3));
    }

    #[tokio::test]
    async fn summaries_cover_every_interval_without_gaps() {
        let storage = Arc::new(InMemoryStorage::new());
        let driver = seed_three_day_history(&storage).await;
        let service = SummaryService::new(storage.clone());

        let summaries = service
            .rollover(&driver, day0() + Duration::days(5))
            .await
            .unwrap();

        assert_eq!(summaries.len(), 5);
        for pair in summaries.windows(2) {
            assert_eq!(pair[0].end_date, pair[1].start_date);
        }
        // cumulative fields equal the running sum of interval fields
        let mut ride = 0;
        let mut energy = 0;
        for s in &summaries {
            ride += s.ride_distance;
            energy += s.energy_used;
            assert_eq!(s.cumulative_ride_distance, ride);
            assert_eq!(s.cumulative_energy_used, energy);
        }
    }

    #[tokio::test]
    async fn incremental_rollover_resumes_where_it_stopped() {
        let storage = Arc::new(InMemoryStorage::new());
        let driver = seed_three_day_history(&storage).await;
        let service = SummaryService::new(storage.clone());

        service
            .rollover(&driver, day0() + Duration::hours(3))
            .await
            .unwrap();
        service
            .rollover(&driver, day0() + Duration::days(2) + Duration::hours(2))
            .await
            .unwrap();

        let all = storage.summaries_for_driver(1).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].ride_distance, 40);
        assert_eq!(all[2].cumulative_ride_distance, 80);
        assert_eq!(all[2].cumulative_energy_used, 60);
    }

    #[tokio::test]
    async fn rebuild_matches_fresh_rollover() {
        let storage = Arc::new(InMemoryStorage::new());
        let driver = seed_three_day_history(&storage).await;
        let service = SummaryService::new(storage.clone());

        let end = day0() + Duration::days(3);
        let fresh = service.rollover(&driver, end).await.unwrap();

        let rebuilt = service.rebuild(&driver, day0(), end).await.unwrap();

        assert_eq!(fresh.len(), rebuilt.len());
        for (a, b) in fresh.iter().zip(rebuilt.iter()) {
            assert_eq!(a.start_date, b.start_date);
            assert_eq!(a.end_date, b.end_date);
            assert_eq!(a.ride_distance, b.ride_distance);
            assert_eq!(a.energy_used, b.energy_used);
            assert_eq!(a.cumulative_ride_distance, b.cumulative_ride_distance);
            assert_eq!(a.cumulative_energy_used, b.cumulative_energy_used);
            assert_eq!(a.last_transaction, b.last_transaction);
        }
    }

    #[test]
    fn fold_creates_empty_summaries_past_existing_one() {
        let driver = Driver::new(1, "Ozias", day0(), 1);
        let existing = DriverSummary::bootstrap(1, 1, day0());

        let produced = rollover_fold(
            &driver,
            day0() + Duration::days(2) - Duration::hours(1),
            Some(existing.clone()),
            Vec::new(),
        );

        assert_eq!(produced.len(), 2);
        assert_eq!(produced[1].start_date, existing.end_date);
        assert_eq!(produced[1].ride_distance, 0);
    }

    #[test]
    fn boundary_transaction_extends_the_fold() {
        let driver = Driver::new(1, "Ozias", day0(), 1);
        // delta dated exactly at the requested end still lands in a summary
        let deltas = vec![RideDelta {
            transaction: 1,
            date: day0() + Duration::days(1),
            ride_distance: 10,
            energy_used: 5,
        }];

        let produced = rollover_fold(&driver, day0() + Duration::days(1), None, deltas);

        assert_eq!(produced.len(), 2);
        assert_eq!(produced[1].ride_distance, 10);
    }

    #[tokio::test]
    async fn rollover_includes_transaction_dated_exactly_at_target() {
        let storage = Arc::new(InMemoryStorage::new());
        let driver = Driver::new(1, "Ozias", day0(), 1);
        storage.save_driver(driver.clone()).await.unwrap();

        let mut t1 = txn(1, 1, day0() + Duration::hours(1));
        t1.battery_out = Some(1);
        t1.battery_out_energy = Some(500);
        t1.odometer_reading = 2000;
        // the return happens exactly at the rollover target
        let mut t2 = txn(2, 1, day0() + Duration::days(1));
        t2.battery_in = Some(1);
        t2.battery_in_energy = Some(470);
        t2.odometer_reading = 2040;
        t2.last_transaction = Some(1);
        for t in [t1, t2] {
            storage.save_transaction(t).await.unwrap();
        }

        let service = SummaryService::new(storage.clone());
        let summaries = service
            .rollover(&driver, day0() + Duration::days(1))
            .await
            .unwrap();

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[1].ride_distance, 40);
        assert_eq!(summaries[1].energy_used, 30);
        assert_eq!(summaries[1].last_transaction, Some(2));
    }

    #[tokio::test]
    async fn second_transaction_at_the_same_instant_still_rolls_over() {
        let storage = Arc::new(InMemoryStorage::new());
        let driver = Driver::new(1, "Ozias", day0(), 1);
        storage.save_driver(driver.clone()).await.unwrap();
        let service = SummaryService::new(storage.clone());

        let mut t1 = txn(1, 1, day0() + Duration::hours(1));
        t1.battery_out = Some(1);
        t1.battery_out_energy = Some(500);
        t1.odometer_reading = 2000;
        storage.save_transaction(t1).await.unwrap();
        service
            .rollover(&driver, day0() + Duration::hours(1))
            .await
            .unwrap();

        // same instant as t1, recorded afterwards
        let mut t2 = txn(2, 1, day0() + Duration::hours(1));
        t2.battery_in = Some(1);
        t2.battery_in_energy = Some(470);
        t2.odometer_reading = 2040;
        t2.last_transaction = Some(1);
        storage.save_transaction(t2).await.unwrap();
        service
            .rollover(&driver, day0() + Duration::hours(2))
            .await
            .unwrap();

        let all = storage.summaries_for_driver(1).await.unwrap();
        assert_eq!(all[0].ride_distance, 40);
        assert_eq!(all[0].energy_used, 30);
        assert_eq!(all[0].last_transaction, Some(2));
    }

    #[tokio::test]
    async fn rollover_all_isolates_failures() {
        let storage = Arc::new(InMemoryStorage::new());
        let driver = seed_three_day_history(&storage).await;

        // second driver whose summary chain is broken (links to a missing
        // transaction), so their rollover fails
        let other = Driver::new(2, "Kato", day0(), 2);
        storage.save_driver(other.clone()).await.unwrap();
        let mut broken = DriverSummary::bootstrap(99, 2, day0());
        broken.last_transaction = Some(404);
        storage.save_summary(broken).await.unwrap();

        let service = SummaryService::new(storage.clone());
        let succeeded = service
            .rollover_all(day0() + Duration::days(3))
            .await
            .unwrap();

        assert_eq!(succeeded, 1);
        // the healthy driver still got summaries
        assert!(!storage.summaries_for_driver(driver.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_summaries_rebuilds_for_backdated_transaction() {
        let storage = Arc::new(InMemoryStorage::new());
        let driver = seed_three_day_history(&storage).await;
        let service = SummaryService::new(storage.clone());

        let end = day0() + Duration::days(3);
        service.rollover(&driver, end).await.unwrap();

        // a day-1 ride recorded late, between the existing transactions
        let mut late = txn(4, 1, day0() + Duration::days(1) + Duration::hours(1));
        late.odometer_reading = 2060;
        late.battery_in = Some(2);
        late.battery_in_energy = Some(580);
        late.battery_out = Some(3);
        late.battery_out_energy = Some(580);
        late.last_transaction = Some(2);
        storage.save_transaction(late.clone()).await.unwrap();
        // the old day-2 transaction now follows the late one and returns
        // the battery it handed out
        let mut t3 = storage.get_transaction(3).await.unwrap().unwrap();
        t3.battery_in = Some(3);
        t3.last_transaction = Some(4);
        storage.save_transaction(t3).await.unwrap();

        service
            .update_summaries(&late, None, end)
            .await
            .unwrap();

        let all = storage.summaries_for_driver(1).await.unwrap();
        // day-1 interval now carries the late ride: 2060-2040 / 600-580
        assert_eq!(all[1].ride_distance, 20);
        assert_eq!(all[1].energy_used, 20);
        // day-2 recomputed against the new predecessor: 2080-2060 / 580-570
        assert_eq!(all[2].ride_distance, 20);
        assert_eq!(all[2].energy_used, 10);
        assert_eq!(all[2].cumulative_ride_distance, 80);
    }
}
