//! Application services

mod ledger;
mod rollover_monitor;
mod summary;

pub use ledger::{ExchangeRequest, LedgerService};
pub use rollover_monitor::{RolloverConfig, RolloverMonitor};
pub use summary::{rollover_fold, SummaryService};
