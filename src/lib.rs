//! # Fleet Swap Service
//!
//! Custody ledger for a battery-swap fleet: batteries move between vehicles
//! (held by drivers) and charging stations through exchange transactions,
//! and per-driver usage summaries are derived from the transaction history.
//!
//! ## Architecture
//!
//! The project follows Clean Architecture principles:
//!
//! - **domain**: Core business entities, the custody projector and errors
//! - **application**: The transaction ledger, correction cascade and
//!   summary rollover engine
//! - **infrastructure**: Storage port and the in-memory backend
//! - **support**: Graceful shutdown plumbing
//!
//! Custody is always derived by replaying the ledger: a correction marks the
//! superseded record rejected, applies its replacement, and replays every
//! causally-affected later transaction in event order. Summaries holding
//! cumulative totals are rebuilt wholesale whenever a correction or
//! backdated transaction invalidates history.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod support;

pub use config::{default_config_path, AppConfig};

// Re-export the service layer for easy access
pub use application::{ExchangeRequest, LedgerService, RolloverConfig, RolloverMonitor, SummaryService};

// Re-export storage types
pub use infrastructure::{InMemoryStorage, Storage};
