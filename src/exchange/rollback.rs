use super::lifecycle::{CancelOutcome, RequestLifecycle};
use super::model::ExchangeStatus;
use crate::error::ExchangeError;

/// What compensation did after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// The request was still pending and now carries this status.
    Recorded(ExchangeStatus),
    /// The request had already reached a final status, usually because the
    /// swap committed after all.
    Skipped(ExchangeStatus),
    /// There was no request to roll back.
    NothingToRollBack,
    /// The status write itself failed. Logged, never returned to the caller.
    Failed(String),
}

/// Compensates a failed exchange attempt by marking its request final.
#[derive(Clone)]
pub struct RollbackHandler {
    lifecycle: RequestLifecycle,
}

impl RollbackHandler {
    pub fn new(lifecycle: RequestLifecycle) -> Self {
        Self { lifecycle }
    }

    /// Status written for a request whose attempt failed with `cause`.
    pub fn target_status(cause: &ExchangeError) -> ExchangeStatus {
        match cause {
            ExchangeError::Timeout(_) => ExchangeStatus::Timeout,
            _ => ExchangeStatus::Cancelled,
        }
    }

    /// Conditionally finalizes `request_id`. Item records are never touched:
    /// the swap commits atomically, so a failed attempt moved nothing.
    pub async fn compensate(&self, request_id: &str, cause: &ExchangeError) -> RollbackOutcome {
        let target = Self::target_status(cause);

        match self.lifecycle.finalize(request_id, target).await {
            Ok(CancelOutcome::Recorded(status)) => {
                tracing::warn!("Exchange {} marked {} after: {}", request_id, status, cause);
                RollbackOutcome::Recorded(status)
            }
            Ok(CancelOutcome::AlreadyFinal(status)) => {
                tracing::info!(
                    "Exchange {} already {}, leaving it after: {}",
                    request_id,
                    status,
                    cause
                );
                RollbackOutcome::Skipped(status)
            }
            Err(ExchangeError::NotFound(_)) => RollbackOutcome::NothingToRollBack,
            Err(err) => {
                let failure = ExchangeError::RollbackFailed(err.to_string());
                tracing::error!("Exchange {}: {} (original failure: {})", request_id, failure, cause);
                RollbackOutcome::Failed(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::FaultyStore;
    use crate::store::{InMemoryStore, RemoteStore, StorePath};
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;

    async fn pending_request() -> (RollbackHandler, RequestLifecycle, Arc<InMemoryStore>, String) {
        let store = Arc::new(InMemoryStore::new());
        let lifecycle = RequestLifecycle::new(store.clone());
        let id = lifecycle.create("ash", "misty", 1, 7).await.unwrap();
        (RollbackHandler::new(lifecycle.clone()), lifecycle, store, id)
    }

    #[tokio::test]
    async fn test_timeout_is_recorded_as_timeout() {
        let (rollback, lifecycle, _, id) = pending_request().await;

        let outcome = rollback
            .compensate(&id, &ExchangeError::Timeout(Duration::from_secs(90)))
            .await;

        assert_eq!(outcome, RollbackOutcome::Recorded(ExchangeStatus::Timeout));
        assert_eq!(lifecycle.get(&id).await.unwrap().status, ExchangeStatus::Timeout);
    }

    #[tokio::test]
    async fn test_other_failures_cancel() {
        let (rollback, lifecycle, _, id) = pending_request().await;

        let outcome = rollback
            .compensate(&id, &ExchangeError::TransactionAborted("gone".to_string()))
            .await;

        assert_eq!(outcome, RollbackOutcome::Recorded(ExchangeStatus::Cancelled));
        assert_eq!(lifecycle.get(&id).await.unwrap().status, ExchangeStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_completed_request_is_left_alone() {
        let (rollback, lifecycle, store, id) = pending_request().await;
        let status = StorePath::parse(&format!("exchanges/{}/status", id)).unwrap();
        store.write(&status, Value::from("COMPLETED")).await.unwrap();

        let outcome = rollback
            .compensate(&id, &ExchangeError::Timeout(Duration::from_secs(90)))
            .await;

        assert_eq!(outcome, RollbackOutcome::Skipped(ExchangeStatus::Completed));
        assert_eq!(lifecycle.get(&id).await.unwrap().status, ExchangeStatus::Completed);
    }

    #[tokio::test]
    async fn test_missing_request_is_not_created() {
        let (rollback, _, store, _) = pending_request().await;
        let before = store.dump();

        let outcome = rollback.compensate("ghost", &ExchangeError::Cancelled).await;

        assert_eq!(outcome, RollbackOutcome::NothingToRollBack);
        assert_eq!(store.dump(), before);
    }

    #[tokio::test]
    async fn test_unreadable_status_is_reported_not_raised() {
        let (rollback, _, store, id) = pending_request().await;
        let status = StorePath::parse(&format!("exchanges/{}/status", id)).unwrap();
        store.write(&status, Value::from(17)).await.unwrap();

        let outcome = rollback.compensate(&id, &ExchangeError::Cancelled).await;
        assert!(matches!(outcome, RollbackOutcome::Failed(msg) if msg.contains("missing status")));
    }

    #[tokio::test]
    async fn test_refused_status_write_is_reported_not_raised() {
        let store = Arc::new(FaultyStore::new().refuse_transact());
        let lifecycle = RequestLifecycle::new(store.clone());
        let id = lifecycle.create("ash", "misty", 1, 7).await.unwrap();
        let rollback = RollbackHandler::new(lifecycle.clone());

        let outcome = rollback
            .compensate(&id, &ExchangeError::Timeout(Duration::from_secs(90)))
            .await;

        assert!(matches!(outcome, RollbackOutcome::Failed(msg) if msg.contains("refused")));
        assert_eq!(lifecycle.get(&id).await.unwrap().status, ExchangeStatus::Pending);
    }
}
