use super::tree::{get_at, resolve_server_values, set_at};
use super::{
    RemoteStore, ServerClock, StoreError, StorePath, SystemClock, TransactionFn, TxDecision,
    TxOutcome, DEFAULT_MAX_TRANSACTION_RETRIES,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const MAX_KEY_ATTEMPTS: u32 = 5;

/// Process-local store tree for tests and single-node use.
///
/// Every committed write bumps a tree-wide version. Transactions snapshot the
/// tree, run the update function without holding the lock, and only commit if
/// the version is unchanged, retrying otherwise. An optional simulated round
/// trip before each store call makes the contention and deadline behaviour of
/// a remote backend observable.
pub struct InMemoryStore {
    state: Mutex<TreeState>,
    clock: Arc<dyn ServerClock>,
    latency: Option<Duration>,
    jitter: Option<Duration>,
    max_retries: u32,
}

struct TreeState {
    root: Value,
    version: u64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TreeState {
                root: Value::Null,
                version: 0,
            }),
            clock: Arc::new(SystemClock::new()),
            latency: None,
            jitter: None,
            max_retries: DEFAULT_MAX_TRANSACTION_RETRIES,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn ServerClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = Some(jitter);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Copy of the whole tree.
    pub fn dump(&self) -> Value {
        self.state.lock().root.clone()
    }

    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    async fn round_trip(&self) {
        let jitter_ms = match self.jitter {
            Some(jitter) if !jitter.is_zero() => {
                rand::thread_rng().gen_range(0..=jitter.as_millis() as u64)
            }
            _ => 0,
        };
        let delay = self.latency.unwrap_or_default() + Duration::from_millis(jitter_ms);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn read(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        self.round_trip().await;
        let state = self.state.lock();
        Ok(get_at(&state.root, path).cloned())
    }

    async fn write(&self, path: &StorePath, mut value: Value) -> Result<(), StoreError> {
        self.round_trip().await;
        resolve_server_values(&mut value, self.clock.now_millis());

        let mut state = self.state.lock();
        set_at(&mut state.root, path, value);
        state.version += 1;
        tracing::debug!("write {} -> version {}", path, state.version);
        Ok(())
    }

    async fn push_key(&self, path: &StorePath) -> Result<String, StoreError> {
        self.round_trip().await;
        let state = self.state.lock();
        for _ in 0..MAX_KEY_ATTEMPTS {
            let key = uuid::Uuid::new_v4().simple().to_string();
            let candidate = path.join(&key)?;
            if get_at(&state.root, &candidate).is_none() {
                return Ok(key);
            }
        }
        Err(StoreError::AllocationFailed(path.to_string()))
    }

    async fn transact(
        &self,
        path: &StorePath,
        update: &TransactionFn<'_>,
    ) -> Result<TxOutcome, StoreError> {
        for attempt in 1..=self.max_retries {
            self.round_trip().await;
            let (snapshot, seen_version) = {
                let state = self.state.lock();
                let current = get_at(&state.root, path).cloned().unwrap_or(Value::Null);
                (current, state.version)
            };

            let mut next = match update(&snapshot) {
                TxDecision::Commit(next) => next,
                TxDecision::Abort => {
                    tracing::debug!("transaction on {} aborted by update function", path);
                    return Ok(TxOutcome::Aborted);
                }
            };

            self.round_trip().await;
            resolve_server_values(&mut next, self.clock.now_millis());

            let mut state = self.state.lock();
            if state.version != seen_version {
                tracing::debug!(
                    "transaction on {} lost a race (attempt {}/{}), retrying",
                    path,
                    attempt,
                    self.max_retries
                );
                continue;
            }
            set_at(&mut state.root, path, next);
            state.version += 1;
            let committed = get_at(&state.root, path).cloned().unwrap_or(Value::Null);
            return Ok(TxOutcome::Committed(committed));
        }

        Err(StoreError::Contention {
            path: path.to_string(),
            attempts: self.max_retries,
        })
    }
}
