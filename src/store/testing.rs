use super::{InMemoryStore, RemoteStore, StoreError, StorePath, TransactionFn, TxOutcome};
use async_trait::async_trait;
use serde_json::Value;

/// In-memory store that can be told to fail individual operations.
#[derive(Default)]
pub(crate) struct FaultyStore {
    inner: InMemoryStore,
    refuse_push_key: bool,
    refuse_transact: bool,
}

impl FaultyStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// `push_key` fails as if every candidate key collided.
    pub(crate) fn refuse_push_key(mut self) -> Self {
        self.refuse_push_key = true;
        self
    }

    /// `transact` fails as if the backend were unreachable.
    pub(crate) fn refuse_transact(mut self) -> Self {
        self.refuse_transact = true;
        self
    }

    pub(crate) fn inner(&self) -> &InMemoryStore {
        &self.inner
    }
}

#[async_trait]
impl RemoteStore for FaultyStore {
    async fn read(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        self.inner.write(path, value).await
    }

    async fn push_key(&self, path: &StorePath) -> Result<String, StoreError> {
        if self.refuse_push_key {
            return Err(StoreError::AllocationFailed(path.to_string()));
        }
        self.inner.push_key(path).await
    }

    async fn transact(
        &self,
        path: &StorePath,
        update: &TransactionFn<'_>,
    ) -> Result<TxOutcome, StoreError> {
        if self.refuse_transact {
            return Err(StoreError::Unavailable(format!("transaction on {} refused", path)));
        }
        self.inner.transact(path, update).await
    }
}
