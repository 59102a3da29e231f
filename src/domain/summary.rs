//! Per-driver usage summaries over fixed time intervals

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DriverId, SummaryId, TransactionId};

/// Width of one summary interval.
///
/// One day for now. Summaries store both start and end dates, so other
/// widths would work without a schema change.
pub fn summary_interval() -> Duration {
    Duration::days(1)
}

/// The midnight on or before the given instant, i.e. the start of the
/// interval containing it.
pub fn interval_start(date: DateTime<Utc>) -> DateTime<Utc> {
    date.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Usage deltas contributed by one transaction, resolved against its chain
/// predecessor. Precomputing these keeps the rollover fold pure.
#[derive(Debug, Clone, PartialEq)]
pub struct RideDelta {
    pub transaction: TransactionId,
    pub date: DateTime<Utc>,
    pub ride_distance: i32,
    pub energy_used: i32,
}

/// Aggregated usage for one driver over one interval.
///
/// Interval fields reset each interval; cumulative fields only ever grow
/// across a driver's summary sequence. `last_transaction` marks how far the
/// ledger has been folded in, so rollover knows where to resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverSummary {
    pub id: SummaryId,
    pub driver: DriverId,
    pub start_date: DateTime<Utc>,
    /// Exclusive upper bound of the interval
    pub end_date: DateTime<Utc>,
    pub ride_distance: i32,
    pub energy_used: i32,
    pub cumulative_ride_distance: i32,
    pub cumulative_energy_used: i32,
    /// Last transaction folded into this summary
    pub last_transaction: Option<TransactionId>,
}

impl DriverSummary {
    /// First summary for a driver, anchored at the midnight on or before
    /// their start date.
    pub fn bootstrap(id: SummaryId, driver: DriverId, date_started: DateTime<Utc>) -> Self {
        let start_date = interval_start(date_started);
        Self {
            id,
            driver,
            start_date,
            end_date: start_date + summary_interval(),
            ride_distance: 0,
            energy_used: 0,
            cumulative_ride_distance: 0,
            cumulative_energy_used: 0,
            last_transaction: None,
        }
    }

    /// The summary for the interval immediately after `prev`: interval
    /// fields zeroed, cumulative totals carried over.
    pub fn following(id: SummaryId, prev: &DriverSummary) -> Self {
        Self {
            id,
            driver: prev.driver,
            start_date: prev.end_date,
            end_date: prev.end_date + summary_interval(),
            ride_distance: 0,
            energy_used: 0,
            cumulative_ride_distance: prev.cumulative_ride_distance,
            cumulative_energy_used: prev.cumulative_energy_used,
            last_transaction: None,
        }
    }

    /// Whether the given instant falls inside this summary's interval
    pub fn covers(&self, date: DateTime<Utc>) -> bool {
        date >= self.start_date && date < self.end_date
    }

    /// Fold one transaction's deltas into this interval
    pub fn apply_delta(&mut self, delta: &RideDelta) {
        self.ride_distance += delta.ride_distance;
        self.energy_used += delta.energy_used;
        self.cumulative_ride_distance += delta.ride_distance;
        self.cumulative_energy_used += delta.energy_used;
        self.last_transaction = Some(delta.transaction);
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn interval_start_is_midnight_before() {
        let date = Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 12).unwrap();
        let midnight = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap();
        assert_eq!(interval_start(date), midnight);
        assert_eq!(interval_start(midnight), midnight);
    }

    #[test]
    fn bootstrap_anchors_at_midnight() {
        let started = Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap();
        let s = DriverSummary::bootstrap(1, 1, started);
        assert_eq!(s.start_date, Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap());
        assert_eq!(s.end_date, s.start_date + summary_interval());
        assert_eq!(s.cumulative_ride_distance, 0);
    }

    #[test]
    fn following_carries_cumulatives_and_zeroes_interval() {
        let started = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap();
        let mut first = DriverSummary::bootstrap(1, 1, started);
        first.apply_delta(&RideDelta {
            transaction: 9,
            date: started,
            ride_distance: 40,
            energy_used: 30,
        });

        let second = DriverSummary::following(2, &first);
        assert_eq!(second.start_date, first.end_date);
        assert_eq!(second.ride_distance, 0);
        assert_eq!(second.energy_used, 0);
        assert_eq!(second.cumulative_ride_distance, 40);
        assert_eq!(second.cumulative_energy_used, 30);
        assert_eq!(second.last_transaction, None);
    }

    #[test]
    fn apply_delta_updates_interval_and_cumulative() {
        let started = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap();
        let mut s = DriverSummary::bootstrap(1, 1, started);
        s.apply_delta(&RideDelta {
            transaction: 3,
            date: started,
            ride_distance: 40,
            energy_used: 30,
        });
        s.apply_delta(&RideDelta {
            transaction: 4,
            date: started,
            ride_distance: 10,
            energy_used: 5,
        });

        assert_eq!(s.ride_distance, 50);
        assert_eq!(s.energy_used, 35);
        assert_eq!(s.cumulative_ride_distance, 50);
        assert_eq!(s.cumulative_energy_used, 35);
        assert_eq!(s.last_transaction, Some(4));
    }

    #[test]
    fn covers_is_half_open() {
        let started = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap();
        let s = DriverSummary::bootstrap(1, 1, started);
        assert!(s.covers(s.start_date));
        assert!(s.covers(s.end_date - Duration::seconds(1)));
        assert!(!s.covers(s.end_date));
    }
}
