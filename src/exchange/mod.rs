//! Two-party item exchanges.
//!
//! A request is created `PENDING`, then executed once: the executor swaps both
//! items and completes the request in a single store transaction, the guard
//! bounds the attempt by a deadline, and on failure the rollback handler moves
//! the request to `CANCELLED` or `TIMEOUT` unless it already reached a final
//! status.

pub mod executor;
pub mod guard;
pub mod inventory;
pub mod lifecycle;
pub mod model;
pub mod rollback;
pub mod service;

pub use executor::{plan_swap, SwapExecutor, SwapPaths};
pub use guard::TimeoutGuard;
pub use inventory::Inventory;
pub use lifecycle::{CancelOutcome, RequestLifecycle};
pub use model::{ExchangeRequest, ExchangeStatus, OwnedItem, SwapTerms};
pub use rollback::{RollbackHandler, RollbackOutcome};
pub use service::ExchangeService;
