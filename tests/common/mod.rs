#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tradepost::store::{TransactionFn, TxOutcome};
use tradepost::{
    ExchangeService, InMemoryStore, OwnedItem, RemoteStore, StoreError, StorePath,
};

/// In-memory store with hooks for simulating what a remote backend can do
/// to an exchange in flight.
pub struct ScriptedStore {
    inner: Arc<InMemoryStore>,
    commit_delay: Mutex<Option<Duration>>,
    failing_transact: Mutex<Option<StorePath>>,
    interference: Mutex<Option<(StorePath, Value)>>,
}

impl ScriptedStore {
    pub fn new(inner: InMemoryStore) -> Self {
        Self {
            inner: Arc::new(inner),
            commit_delay: Mutex::new(None),
            failing_transact: Mutex::new(None),
            interference: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    /// Holds back the acknowledgement of every committed transaction.
    pub fn delay_after_commit(&self, delay: Duration) {
        *self.commit_delay.lock() = Some(delay);
    }

    /// Refuses every transaction on exactly `path`.
    pub fn fail_transact_at(&self, path: StorePath) {
        *self.failing_transact.lock() = Some(path);
    }

    /// Writes `value` at `path` right before the next transaction starts.
    pub fn interfere_before_transact(&self, path: StorePath, value: Value) {
        *self.interference.lock() = Some((path, value));
    }
}

#[async_trait]
impl RemoteStore for ScriptedStore {
    async fn read(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        self.inner.write(path, value).await
    }

    async fn push_key(&self, path: &StorePath) -> Result<String, StoreError> {
        self.inner.push_key(path).await
    }

    async fn transact(
        &self,
        path: &StorePath,
        update: &TransactionFn<'_>,
    ) -> Result<TxOutcome, StoreError> {
        let refused = self.failing_transact.lock().as_ref() == Some(path);
        if refused {
            return Err(StoreError::Unavailable(format!("transaction on {} refused", path)));
        }

        let interference = self.interference.lock().take();
        if let Some((target, value)) = interference {
            self.inner.write(&target, value).await?;
        }

        let outcome = self.inner.transact(path, update).await?;

        let delay = *self.commit_delay.lock();
        if let (Some(delay), true) = (delay, outcome.is_committed()) {
            tokio::time::sleep(delay).await;
        }
        Ok(outcome)
    }
}

pub fn path(raw: &str) -> StorePath {
    StorePath::parse(raw).unwrap()
}

/// Gives `ash` item 1 (Bulbasaur) and `misty` item 7 (Squirtle).
pub async fn seed_trainers(service: &ExchangeService) {
    service
        .inventory()
        .deposit(
            "ash",
            OwnedItem::new(1, "Bulbasaur", "ash").with_image_url("https://img.example/1.png"),
        )
        .await
        .unwrap();
    service
        .inventory()
        .deposit(
            "misty",
            OwnedItem::new(7, "Squirtle", "misty").with_image_url("https://img.example/7.png"),
        )
        .await
        .unwrap();
}

/// Parties whose collection currently holds `item_id`.
pub async fn holders_of(service: &ExchangeService, item_id: u64) -> Vec<String> {
    let mut holders = Vec::new();
    for party in ["ash", "misty"] {
        if service.inventory().item(party, item_id).await.unwrap().is_some() {
            holders.push(party.to_string());
        }
    }
    holders
}
