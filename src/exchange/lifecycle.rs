use super::model::{
    exchange_path, exchanges_root, ExchangeRequest, ExchangeStatus, STATUS_FIELD,
};
use crate::error::{ExchangeError, Result};
use crate::store::{
    server_timestamp, RemoteStore, StoreError, StorePath, TxDecision, TxOutcome,
};
use crate::{ItemId, RequestId};
use serde_json::{json, Value};
use std::sync::Arc;

/// What a conditional finalization did to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The request was `PENDING` and now carries this status.
    Recorded(ExchangeStatus),
    /// The request had already reached this final status and was left alone.
    AlreadyFinal(ExchangeStatus),
}

/// Creates, reads and finalizes exchange request records.
#[derive(Clone)]
pub struct RequestLifecycle {
    store: Arc<dyn RemoteStore>,
}

impl RequestLifecycle {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    pub async fn create(
        &self,
        party_a: &str,
        party_b: &str,
        item_a: ItemId,
        item_b: ItemId,
    ) -> Result<RequestId> {
        validate_parties(party_a, party_b)?;

        let id = self
            .store
            .push_key(&exchanges_root()?)
            .await
            .map_err(|e| match e {
                StoreError::AllocationFailed(path) => ExchangeError::AllocationFailed(path),
                other => ExchangeError::Store(other),
            })?;

        let record = json!({
            "id": id,
            "partyAId": party_a,
            "partyBId": party_b,
            "itemAId": item_a,
            "itemBId": item_b,
            "status": ExchangeStatus::Pending.as_str(),
            "createdAt": server_timestamp(),
        });
        self.store.write(&exchange_path(&id)?, record).await?;

        tracing::info!(
            "Created exchange {}: {} trades item {} for item {} of {}",
            id,
            party_a,
            item_a,
            item_b,
            party_b
        );
        Ok(id)
    }

    /// Reads a request for display. See [`ExchangeRequest::from_snapshot_lenient`].
    pub async fn get(&self, request_id: &str) -> Result<ExchangeRequest> {
        let snapshot = self
            .store
            .read(&exchange_path(request_id)?)
            .await?
            .ok_or_else(|| ExchangeError::NotFound(request_id.to_string()))?;
        Ok(ExchangeRequest::from_snapshot_lenient(request_id, &snapshot))
    }

    /// Moves a `PENDING` request to `CANCELLED`. Already final requests are
    /// left untouched.
    pub async fn cancel(&self, request_id: &str) -> Result<CancelOutcome> {
        let outcome = self.finalize(request_id, ExchangeStatus::Cancelled).await?;
        match outcome {
            CancelOutcome::Recorded(_) => tracing::info!("Exchange {} cancelled", request_id),
            CancelOutcome::AlreadyFinal(status) => tracing::info!(
                "Exchange {} already {}, cancel is a no-op",
                request_id,
                status
            ),
        }
        Ok(outcome)
    }

    /// Writes `status` only if the stored status is still `PENDING`, checked
    /// inside a store transaction so a concurrent completion is never
    /// overwritten.
    pub(crate) async fn finalize(
        &self,
        request_id: &str,
        status: ExchangeStatus,
    ) -> Result<CancelOutcome> {
        let path = exchange_path(request_id)?;
        let target = status.as_str();

        let outcome = self
            .store
            .transact(&path, &|current: &Value| {
                let pending = current.get(STATUS_FIELD).and_then(Value::as_str)
                    == Some(ExchangeStatus::Pending.as_str());
                if !pending {
                    return TxDecision::Abort;
                }
                let mut next = current.clone();
                next[STATUS_FIELD] = Value::from(target);
                TxDecision::Commit(next)
            })
            .await?;

        if let TxOutcome::Committed(_) = outcome {
            return Ok(CancelOutcome::Recorded(status));
        }

        // Aborted: either there is no record or it is no longer pending.
        let current = self
            .store
            .read(&path)
            .await?
            .ok_or_else(|| ExchangeError::NotFound(request_id.to_string()))?;
        let stored = current
            .get(STATUS_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ExchangeError::MalformedRequest(format!("{}: missing status", request_id))
            })?
            .parse::<ExchangeStatus>()?;
        Ok(CancelOutcome::AlreadyFinal(stored))
    }
}

fn validate_parties(party_a: &str, party_b: &str) -> Result<()> {
    if party_a.is_empty() || party_b.is_empty() {
        return Err(ExchangeError::Validation("Party ids cannot be empty".to_string()));
    }
    if party_a == party_b {
        return Err(ExchangeError::Validation(format!(
            "{} cannot trade with themselves",
            party_a
        )));
    }
    // Party ids become keys under `items/`.
    for party in [party_a, party_b] {
        StorePath::root().join(party).map_err(|e| {
            ExchangeError::Validation(format!("Invalid party id '{}': {}", party, e))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::FaultyStore;
    use crate::store::InMemoryStore;

    fn lifecycle() -> (RequestLifecycle, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (RequestLifecycle::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_create_then_get_is_pending() -> Result<()> {
        let (lifecycle, _) = lifecycle();

        let id = lifecycle.create("ash", "misty", 1, 7).await?;
        let request = lifecycle.get(&id).await?;

        assert_eq!(request.id, id);
        assert_eq!(request.party_a_id, "ash");
        assert_eq!(request.party_b_id, "misty");
        assert_eq!(request.item_a_id, 1);
        assert_eq!(request.item_b_id, 7);
        assert_eq!(request.status, ExchangeStatus::Pending);
        assert!(request.created_at > 0);
        assert_eq!(request.completed_at, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_rejects_self_trade() {
        let (lifecycle, _) = lifecycle();
        let result = lifecycle.create("ash", "ash", 1, 7).await;
        assert!(matches!(result, Err(ExchangeError::Validation(_))));

        let result = lifecycle.create("", "misty", 1, 7).await;
        assert!(matches!(result, Err(ExchangeError::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_rejects_party_ids_that_are_not_keys() {
        let (lifecycle, store) = lifecycle();

        let result = lifecycle.create("ash/x", "misty", 1, 7).await;
        assert!(matches!(result, Err(ExchangeError::Validation(msg)) if msg.contains("ash/x")));

        let result = lifecycle.create("ash", "misty.b", 1, 7).await;
        assert!(matches!(result, Err(ExchangeError::Validation(_))));
        assert!(store.dump().is_null());
    }

    #[tokio::test]
    async fn test_create_reports_key_allocation_failure() {
        let store = Arc::new(FaultyStore::new().refuse_push_key());
        let lifecycle = RequestLifecycle::new(store.clone());

        let result = lifecycle.create("ash", "misty", 1, 7).await;

        assert!(matches!(
            result,
            Err(ExchangeError::AllocationFailed(path)) if path == "/exchanges"
        ));
        assert!(store.inner().dump().is_null());
    }

    #[tokio::test]
    async fn test_get_missing_request() {
        let (lifecycle, _) = lifecycle();
        assert!(matches!(
            lifecycle.get("nope").await,
            Err(ExchangeError::NotFound(id)) if id == "nope"
        ));
    }

    #[tokio::test]
    async fn test_cancel_pending_then_again() -> Result<()> {
        let (lifecycle, _) = lifecycle();
        let id = lifecycle.create("ash", "misty", 1, 7).await?;

        assert_eq!(
            lifecycle.cancel(&id).await?,
            CancelOutcome::Recorded(ExchangeStatus::Cancelled)
        );
        assert_eq!(
            lifecycle.cancel(&id).await?,
            CancelOutcome::AlreadyFinal(ExchangeStatus::Cancelled)
        );
        assert_eq!(lifecycle.get(&id).await?.status, ExchangeStatus::Cancelled);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_never_reverts_completed() -> Result<()> {
        let (lifecycle, store) = lifecycle();
        let id = lifecycle.create("ash", "misty", 1, 7).await?;
        let status = StorePath::parse(&format!("exchanges/{}/status", id)).unwrap();
        store.write(&status, Value::from("COMPLETED")).await?;

        assert_eq!(
            lifecycle.cancel(&id).await?,
            CancelOutcome::AlreadyFinal(ExchangeStatus::Completed)
        );
        assert_eq!(lifecycle.get(&id).await?.status, ExchangeStatus::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_missing_request_creates_nothing() {
        let (lifecycle, store) = lifecycle();
        assert!(matches!(
            lifecycle.cancel("ghost").await,
            Err(ExchangeError::NotFound(_))
        ));
        assert!(store.dump().is_null());
    }

    #[tokio::test]
    async fn test_cancel_malformed_status_is_reported() -> Result<()> {
        let (lifecycle, store) = lifecycle();
        let id = lifecycle.create("ash", "misty", 1, 7).await?;
        let status = StorePath::parse(&format!("exchanges/{}/status", id)).unwrap();
        store.write(&status, Value::from("???")).await?;

        assert!(matches!(
            lifecycle.cancel(&id).await,
            Err(ExchangeError::MalformedRequest(_))
        ));
        Ok(())
    }
}
