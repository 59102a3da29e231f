//! Transaction ledger service.
//!
//! Owns insertion of exchange events and the correction cascade: a new or
//! corrected transaction reverses the superseded record, applies itself, and
//! replays every causally-affected later transaction in event order so final
//! custody always reflects the latest event for each entity.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::domain::{
    BatteryHistoryEntry, BatteryId, BatteryLocation, BatteryTransaction, CustodyWorkSet,
    DomainError, DomainResult, DriverId, HistoryOwner, StationId, TransactionId,
};
use crate::infrastructure::Storage;

use super::SummaryService;

/// One exchange event as submitted by a caller
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    pub driver: DriverId,
    /// Battery the driver returned to the station
    pub battery_in: Option<BatteryId>,
    /// Battery the driver took out
    pub battery_out: Option<BatteryId>,
    pub charging_station: Option<StationId>,
    pub battery_in_energy: Option<i32>,
    pub battery_out_energy: Option<i32>,
    pub odometer_reading: i32,
    /// Event time; defaults to the correction's date, else the submit time
    pub transaction_date: Option<DateTime<Utc>>,
    /// Transaction this event supersedes
    pub correction: Option<TransactionId>,
}

impl ExchangeRequest {
    pub fn new(driver: DriverId) -> Self {
        Self {
            driver,
            battery_in: None,
            battery_out: None,
            charging_station: None,
            battery_in_energy: None,
            battery_out_energy: None,
            odometer_reading: 0,
            transaction_date: None,
            correction: None,
        }
    }
}

/// Service owning the transaction ledger and its correction cascade
pub struct LedgerService {
    storage: Arc<dyn Storage>,
    summaries: SummaryService,
    /// Single writer per driver: concurrent cascades on the same custody
    /// chain must not interleave
    driver_locks: DashMap<DriverId, Arc<Mutex<()>>>,
}

impl LedgerService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            summaries: SummaryService::new(storage.clone()),
            storage,
            driver_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, driver: DriverId) -> Arc<Mutex<()>> {
        self.driver_locks
            .entry(driver)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Take the per-driver locks in id order to avoid lock cycles when a
    /// correction crosses drivers
    async fn lock_drivers(&self, mut ids: Vec<DriverId>) -> Vec<OwnedMutexGuard<()>> {
        ids.sort_unstable();
        ids.dedup();
        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            guards.push(self.lock_for(id).lock_owned().await);
        }
        guards
    }

    /// Record one exchange event and bring custody state and summaries in
    /// line with it.
    ///
    /// Everything computed during the cascade is held in memory and only
    /// persisted once the whole cascade has succeeded, so a failing submit
    /// leaves no partial state behind. The post-cascade writes (transaction,
    /// entities, summaries) are sequential upserts; a durable [`Storage`]
    /// backend must wrap one `submit` call in a single storage transaction
    /// to make them atomic against crashes.
    pub async fn submit(
        &self,
        request: ExchangeRequest,
        now: DateTime<Utc>,
    ) -> DomainResult<BatteryTransaction> {
        let driver = self.storage.get_driver(request.driver).await?.ok_or(
            DomainError::InvalidReference {
                entity: "driver",
                id: request.driver,
            },
        )?;

        for battery in [request.battery_in, request.battery_out].into_iter().flatten() {
            self.storage.get_battery(battery).await?.ok_or(
                DomainError::InvalidReference {
                    entity: "battery",
                    id: battery,
                },
            )?;
        }
        if let Some(station) = request.charging_station {
            self.storage.get_station(station).await?.ok_or(
                DomainError::InvalidReference {
                    entity: "charging_station",
                    id: station,
                },
            )?;
        }

        let correction = match request.correction {
            Some(id) => {
                let corrected = self.storage.get_transaction(id).await?.ok_or(
                    DomainError::InvalidReference {
                        entity: "transaction",
                        id,
                    },
                )?;
                // a correction must target a currently-active record;
                // re-correcting a rejected one would fork the chain
                if corrected.rejected {
                    return Err(DomainError::AlreadyRejected(id));
                }
                Some(corrected)
            }
            None => None,
        };

        let mut lock_ids = vec![driver.id];
        if let Some(corrected) = &correction {
            lock_ids.push(corrected.driver);
        }
        let _guards = self.lock_drivers(lock_ids).await;

        // a correction keeps the original event time unless overridden
        let transaction_date = request
            .transaction_date
            .or_else(|| correction.as_ref().map(|c| c.transaction_date))
            .unwrap_or(now);

        let mut last_transaction = self
            .storage
            .latest_transaction_for_driver(driver.id, Some(transaction_date))
            .await?;
        // the correction is about to be rejected, so it cannot anchor the
        // chain; fall back to its own predecessor
        if let (Some(last), Some(corrected)) = (&last_transaction, &correction) {
            if last.id == corrected.id {
                last_transaction = match corrected.last_transaction {
                    Some(prev) => self.storage.get_transaction(prev).await?,
                    None => None,
                };
            }
        }

        let new_transaction = BatteryTransaction {
            id: self.storage.next_transaction_id().await,
            driver: driver.id,
            battery_in: request.battery_in,
            battery_out: request.battery_out,
            battery_in_energy: request.battery_in_energy,
            battery_out_energy: request.battery_out_energy,
            odometer_reading: request.odometer_reading,
            charging_station: request.charging_station,
            rejected: false,
            correction: correction.as_ref().map(|c| c.id),
            last_transaction: last_transaction.as_ref().map(|t| t.id),
            transaction_date,
            date_added: now,
        };

        let (mutated, relinked) = self.cascade(&new_transaction, correction.as_ref()).await?;

        // cascade done: persist the new record, the rejected correction,
        // re-linked successors and every touched entity as one unit
        self.storage.save_transaction(new_transaction.clone()).await?;
        if let Some(corrected) = &correction {
            let mut rejected = corrected.clone();
            rejected.rejected = true;
            self.storage.save_transaction(rejected).await?;
        }
        for txn in relinked {
            self.storage.save_transaction(txn).await?;
        }
        for battery in mutated.batteries() {
            self.storage.save_battery(battery.clone()).await?;
        }
        for vehicle in mutated.vehicles() {
            self.storage.save_vehicle(vehicle.clone()).await?;
        }

        self.summaries
            .update_summaries(&new_transaction, correction.as_ref(), now)
            .await?;

        info!(
            transaction = new_transaction.id,
            driver = driver.id,
            correction = ?new_transaction.correction,
            "exchange recorded at {}",
            transaction_date
        );
        Ok(new_transaction)
    }

    /// Reverse the superseded transaction, apply the new one, and replay
    /// every possibly-affected transaction in ascending event order.
    ///
    /// The replay set is a conservative superset: any non-rejected
    /// transaction matching an affected driver or battery, or dated after
    /// the new event. Replays are idempotent (each one re-asserts where its
    /// batteries end up), so over-replaying is safe; under-replaying is not.
    async fn cascade(
        &self,
        new_transaction: &BatteryTransaction,
        correction: Option<&BatteryTransaction>,
    ) -> DomainResult<(CustodyWorkSet, Vec<BatteryTransaction>)> {
        let mut driver_ids = vec![new_transaction.driver];
        let mut battery_ids: Vec<BatteryId> = [
            new_transaction.battery_in,
            new_transaction.battery_out,
        ]
        .into_iter()
        .flatten()
        .collect();
        if let Some(corrected) = correction {
            driver_ids.push(corrected.driver);
            battery_ids.extend(
                [corrected.battery_in, corrected.battery_out]
                    .into_iter()
                    .flatten(),
            );
        }

        let mut replay = self
            .storage
            .transactions_affecting(&driver_ids, &battery_ids, new_transaction.transaction_date)
            .await?;
        // the superseded record replays through its replacement instead
        replay.retain(|t| Some(t.id) != correction.map(|c| c.id));
        replay.push(new_transaction.clone());
        replay.sort_by_key(|t| (t.transaction_date, t.id));

        let mut work_set = self.load_work_set(&replay, correction).await?;

        if let Some(corrected) = correction {
            work_set.reverse(corrected);
        }
        work_set.apply(new_transaction);

        let mut relinked = Vec::new();
        for txn in &mut replay {
            if let Some(corrected) = correction {
                if txn.last_transaction == Some(corrected.id) {
                    txn.last_transaction = Some(new_transaction.id);
                    relinked.push(txn.clone());
                }
            }
            work_set.apply(txn);
        }

        // should be unreachable: every link to the rejected record was just
        // rewritten above
        if let Some(corrected) = correction {
            if replay
                .iter()
                .chain(std::iter::once(new_transaction))
                .any(|t| t.last_transaction == Some(corrected.id))
            {
                return Err(DomainError::InconsistentChain(format!(
                    "a transaction still links to rejected transaction {}",
                    corrected.id
                )));
            }
        }

        debug!(
            transaction = new_transaction.id,
            replayed = replay.len(),
            relinked = relinked.len(),
            "cascade complete"
        );
        Ok((work_set, relinked))
    }

    /// Load every entity the cascade might touch into one work set
    async fn load_work_set(
        &self,
        replay: &[BatteryTransaction],
        correction: Option<&BatteryTransaction>,
    ) -> DomainResult<CustodyWorkSet> {
        let mut driver_ids = BTreeSet::new();
        let mut battery_ids = BTreeSet::new();
        for txn in replay.iter().chain(correction) {
            driver_ids.insert(txn.driver);
            battery_ids.extend([txn.battery_in, txn.battery_out].into_iter().flatten());
        }

        let mut work_set = CustodyWorkSet::new();
        for id in driver_ids {
            if let Some(driver) = self.storage.get_driver(id).await? {
                if let Some(vehicle) = self.storage.get_vehicle(driver.vehicle).await? {
                    work_set.insert_vehicle(vehicle);
                }
                work_set.insert_driver(driver);
            }
        }
        for id in battery_ids {
            if let Some(battery) = self.storage.get_battery(id).await? {
                work_set.insert_battery(battery);
            }
        }
        Ok(work_set)
    }

    // ── Custody queries ────────────────────────────────────────

    /// Where a battery currently is, per the most recent non-rejected
    /// transaction that touched it
    pub async fn battery_location(&self, id: BatteryId) -> DomainResult<BatteryLocation> {
        let battery = self.storage.get_battery(id).await?.ok_or(
            DomainError::InvalidReference {
                entity: "battery",
                id,
            },
        )?;
        if let Some(station) = battery.charging_station {
            return Ok(BatteryLocation::AtStation(station));
        }
        let vehicle = self
            .storage
            .list_vehicles()
            .await?
            .into_iter()
            .find(|v| v.battery == Some(id));
        Ok(match vehicle {
            Some(v) => BatteryLocation::OnVehicle(v.id),
            None => BatteryLocation::Unassigned,
        })
    }

    /// Current energy of a battery: the reading recorded by its most recent
    /// transaction, the "in" reading winning when the battery was returned.
    /// Zero for a battery with no history.
    pub async fn battery_current_energy(&self, id: BatteryId) -> DomainResult<i32> {
        let history = self.storage.transactions_for_battery(id).await?;
        let latest = match history.first() {
            Some(txn) => txn,
            None => return Ok(0),
        };
        let energy = if latest.battery_in == Some(id) {
            latest.battery_in_energy
        } else {
            latest.battery_out_energy
        };
        Ok(energy.unwrap_or(0))
    }

    /// A battery's custody history, newest first: who held it after each
    /// transaction, with ride figures for returns and the station charge
    /// delta for pick-ups
    pub async fn battery_history(&self, id: BatteryId) -> DomainResult<Vec<BatteryHistoryEntry>> {
        let transactions = self.storage.transactions_for_battery(id).await?;
        let mut history = Vec::with_capacity(transactions.len());

        for txn in &transactions {
            let last = match txn.last_transaction {
                Some(prev) => self.storage.get_transaction(prev).await?,
                None => None,
            };
            let last = last.as_ref();

            let entry = if txn.battery_in == Some(id) {
                BatteryHistoryEntry {
                    date: txn.transaction_date,
                    owner: txn.charging_station.map(HistoryOwner::Station),
                    energy: txn.battery_in_energy,
                    ride_distance: Some(txn.ride_distance(last)),
                    efficiency: Some(txn.efficiency(last)),
                    charge_amount: None,
                }
            } else {
                BatteryHistoryEntry {
                    date: txn.transaction_date,
                    owner: Some(HistoryOwner::Driver(txn.driver)),
                    energy: txn.battery_out_energy,
                    ride_distance: None,
                    efficiency: None,
                    charge_amount: txn.charge_amount(last),
                }
            };
            history.push(entry);
        }

        Ok(history)
    }
}

// ── Tests ──────────────────────────────────────────────────────
