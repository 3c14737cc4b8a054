//! # Tradepost
//!
//! Coordination engine for two-party item exchanges backed by a remote,
//! path-addressed JSON store.
//!
//! ## Architecture
//!
//! - **Store**: `RemoteStore` contract with optimistic transactions, an
//!   in-memory backend and a SQLite backend
//! - **Lifecycle**: creates `PENDING` requests and finalizes them conditionally
//! - **Executor**: swaps both items and completes the request in one transaction
//! - **Guard**: deadline and cancellation around each attempt
//! - **Rollback**: marks failed attempts `CANCELLED` or `TIMEOUT` without
//!   overwriting a completed swap

pub mod config;
pub mod error;
pub mod exchange;
pub mod logging;
pub mod store;

pub use config::AppConfig;
pub use error::{ExchangeError, Result};
pub use exchange::{
    CancelOutcome, ExchangeRequest, ExchangeService, ExchangeStatus, Inventory, OwnedItem,
};
pub use store::{InMemoryStore, RemoteStore, SqliteStore, StoreError, StorePath};

pub type RequestId = String;
pub type PartyId = String;
pub type ItemId = u64;
