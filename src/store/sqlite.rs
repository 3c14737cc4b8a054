use super::tree::{get_at, resolve_server_values, set_at};
use super::{
    RemoteStore, ServerClock, StoreError, StorePath, SystemClock, TransactionFn, TxDecision,
    TxOutcome, DEFAULT_MAX_TRANSACTION_RETRIES,
};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const MAX_KEY_ATTEMPTS: u32 = 5;

/// Store tree persisted in SQLite as one versioned JSON document.
///
/// Writes and transactions are compare-and-set on the document version, so
/// several processes sharing the database file get the same optimistic
/// retry semantics as [`super::InMemoryStore`].
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    clock: Arc<dyn ServerClock>,
    max_retries: u32,
}

impl SqliteStore {
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        // Every connection to an in-memory database sees its own empty file.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(
                SqliteConnectOptions::from_str(database_url)?
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .busy_timeout(Duration::from_secs(5)),
            )
            .await?;

        let store = Self {
            pool,
            clock: Arc::new(SystemClock::new()),
            max_retries: DEFAULT_MAX_TRANSACTION_RETRIES,
        };
        store.migrate().await?;
        Ok(store)
    }

    pub fn with_clock(mut self, clock: Arc<dyn ServerClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS store_tree (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                document TEXT NOT NULL,
                version INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("INSERT OR IGNORE INTO store_tree (id, document, version) VALUES (1, 'null', 0)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn load(&self) -> Result<(Value, i64), StoreError> {
        let (document, version) =
            sqlx::query_as::<_, (String, i64)>("SELECT document, version FROM store_tree WHERE id = 1")
                .fetch_one(&self.pool)
                .await?;
        Ok((serde_json::from_str(&document)?, version))
    }

    // Returns false when another writer bumped the version first.
    async fn compare_and_swap(&self, root: &Value, expected_version: i64) -> Result<bool, StoreError> {
        let document = serde_json::to_string(root)?;
        let result = sqlx::query(
            "UPDATE store_tree SET document = ?, version = version + 1 WHERE id = 1 AND version = ?",
        )
        .bind(document)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Copy of the whole tree.
    pub async fn dump(&self) -> Result<Value, StoreError> {
        Ok(self.load().await?.0)
    }
}

#[async_trait]
impl RemoteStore for SqliteStore {
    async fn read(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        let (root, _) = self.load().await?;
        Ok(get_at(&root, path).cloned())
    }

    async fn write(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        for _ in 0..self.max_retries {
            let (mut root, version) = self.load().await?;
            let mut value = value.clone();
            resolve_server_values(&mut value, self.clock.now_millis());
            set_at(&mut root, path, value);

            if self.compare_and_swap(&root, version).await? {
                tracing::debug!("write {} -> version {}", path, version + 1);
                return Ok(());
            }
        }
        Err(StoreError::Contention {
            path: path.to_string(),
            attempts: self.max_retries,
        })
    }

    async fn push_key(&self, path: &StorePath) -> Result<String, StoreError> {
        let (root, _) = self.load().await?;
        for _ in 0..MAX_KEY_ATTEMPTS {
            let key = uuid::Uuid::new_v4().simple().to_string();
            if get_at(&root, &path.join(&key)?).is_none() {
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
            let (mut root, version) = self.load().await?;
            let snapshot = get_at(&root, path).cloned().unwrap_or(Value::Null);

            let mut next = match update(&snapshot) {
                TxDecision::Commit(next) => next,
                TxDecision::Abort => return Ok(TxOutcome::Aborted),
            };
            resolve_server_values(&mut next, self.clock.now_millis());
            set_at(&mut root, path, next);

            if self.compare_and_swap(&root, version).await? {
                let committed = get_at(&root, path).cloned().unwrap_or(Value::Null);
                return Ok(TxOutcome::Committed(committed));
            }
            tracing::debug!(
                "transaction on {} lost a race (attempt {}/{}), retrying",
                path,
                attempt,
                self.max_retries
            );
        }

        Err(StoreError::Contention {
            path: path.to_string(),
            attempts: self.max_retries,
        })
    }
}
