//! Remote store client contract.
//!
//! The exchange engine only ever talks to the store through [`RemoteStore`]:
//! path-addressed reads, unconditional writes, key allocation and a single
//! atomic read-compute-write transaction over a subtree.

pub mod memory;
pub mod path;
pub mod sqlite;
#[cfg(test)]
pub(crate) mod testing;
pub mod tree;

pub use memory::InMemoryStore;
pub use path::StorePath;
pub use sqlite::SqliteStore;
pub use tree::server_timestamp;

use crate::config::{StoreBackend, StoreConfig};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Attempts a transaction gets before the store gives up under contention.
pub const DEFAULT_MAX_TRANSACTION_RETRIES: u32 = 25;

/// What a transaction function decided for the snapshot it was shown.
#[derive(Debug, Clone, PartialEq)]
pub enum TxDecision {
    Commit(Value),
    Abort,
}

/// Final result of [`RemoteStore::transact`].
#[derive(Debug, Clone, PartialEq)]
pub enum TxOutcome {
    /// The new value at the transaction path, with server values resolved.
    Committed(Value),
    Aborted,
}

impl TxOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, TxOutcome::Committed(_))
    }
}

/// Update function for [`RemoteStore::transact`].
///
/// It receives the current value at the transaction path (`Value::Null` when
/// absent) and may be called once per attempt, so it must be a pure function
/// of that snapshot.
pub type TransactionFn<'a> = dyn Fn(&Value) -> TxDecision + Send + Sync + 'a;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn read(&self, path: &StorePath) -> Result<Option<Value>, StoreError>;

    /// Unconditional overwrite. Writing `Value::Null` deletes the node.
    async fn write(&self, path: &StorePath, value: Value) -> Result<(), StoreError>;

    /// Allocates a fresh child key under `path` that is not in use.
    async fn push_key(&self, path: &StorePath) -> Result<String, StoreError>;

    /// Runs `update` against the current value at `path` and commits its
    /// result atomically, re-running it if a concurrent writer got there first.
    async fn transact(
        &self,
        path: &StorePath,
        update: &TransactionFn<'_>,
    ) -> Result<TxOutcome, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid store path: {0}")]
    InvalidPath(String),

    #[error("transaction on {path} gave up after {attempts} conflicting attempts")]
    Contention { path: String, attempts: u32 },

    #[error("could not allocate a unique key under {0}")]
    AllocationFailed(String),

    #[error("stored document is not valid JSON: {0}")]
    Serialization(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Source of server-assigned timestamps, in epoch milliseconds.
#[cfg_attr(test, mockall::automock)]
pub trait ServerClock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock that never hands out a smaller value than it already has.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ServerClock for SystemClock {
    fn now_millis(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let previous = self.last.fetch_max(now, Ordering::SeqCst);
        previous.max(now)
    }
}

/// Builds the store backend selected in configuration.
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn RemoteStore>, StoreError> {
    match config.backend {
        StoreBackend::Memory => {
            let mut store = InMemoryStore::new().with_max_retries(config.max_transaction_retries);
            if let Some(latency_ms) = config.simulated_latency_ms.filter(|ms| *ms > 0) {
                store = store.with_latency(Duration::from_millis(latency_ms));
            }
            if let Some(jitter_ms) = config.simulated_jitter_ms.filter(|ms| *ms > 0) {
                store = store.with_jitter(Duration::from_millis(jitter_ms));
            }
            tracing::info!("Using in-memory store");
            Ok(Arc::new(store))
        }
        StoreBackend::Sqlite => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| StoreError::Unavailable("sqlite backend needs a url".to_string()))?;
            let store = SqliteStore::new(url)
                .await?
                .with_max_retries(config.max_transaction_retries);
            tracing::info!("Using sqlite store at {}", url);
            Ok(Arc::new(store))
        }
    }
}
