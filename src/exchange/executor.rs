use super::guard::until_cancelled;
use super::model::{
    exchange_path, item_path, ExchangeStatus, SwapTerms, OWNER_FIELD, STATUS_FIELD,
};
use crate::error::{ExchangeError, Result};
use crate::store::tree::{get_at, set_at};
use crate::store::{
    server_timestamp, RemoteStore, StoreError, StorePath, TxDecision, TxOutcome,
};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Absolute store paths one swap touches, computed once per attempt.
#[derive(Debug, Clone)]
pub struct SwapPaths {
    status: StorePath,
    completed_at: StorePath,
    item_a: StorePath,
    item_b: StorePath,
    item_a_dest: StorePath,
    item_b_dest: StorePath,
}

impl SwapPaths {
    pub fn new(terms: &SwapTerms) -> std::result::Result<Self, StoreError> {
        let request = terms.request_path()?;
        Ok(Self {
            status: request.join(STATUS_FIELD)?,
            completed_at: request.join("completedAt")?,
            item_a: terms.item_a_path()?,
            item_b: terms.item_b_path()?,
            item_a_dest: item_path(&terms.party_b, terms.item_a)?,
            item_b_dest: item_path(&terms.party_a, terms.item_b)?,
        })
    }
}

/// Decides the post-swap tree for one transaction attempt.
///
/// Aborts unless the request is still `PENDING`, both items are held by their
/// original owners and neither destination slot is taken by an item that
/// stays put. Must stay free of side effects: the store may call it again
/// with a fresher snapshot.
pub fn plan_swap(root: &Value, paths: &SwapPaths, terms: &SwapTerms) -> TxDecision {
    let pending = get_at(root, &paths.status).and_then(Value::as_str)
        == Some(ExchangeStatus::Pending.as_str());
    if !pending {
        return TxDecision::Abort;
    }

    let (Some(item_a), Some(item_b)) = (get_at(root, &paths.item_a), get_at(root, &paths.item_b))
    else {
        return TxDecision::Abort;
    };
    if !item_a.is_object() || !item_b.is_object() {
        return TxDecision::Abort;
    }

    // A destination may only be occupied by the item that is about to leave it.
    let blocked = |dest: &StorePath| {
        get_at(root, dest).is_some() && *dest != paths.item_a && *dest != paths.item_b
    };
    if blocked(&paths.item_a_dest) || blocked(&paths.item_b_dest) {
        return TxDecision::Abort;
    }

    let moved_a = with_owner(item_a, &terms.party_b);
    let moved_b = with_owner(item_b, &terms.party_a);

    let mut next = root.clone();
    set_at(&mut next, &paths.item_a, Value::Null);
    set_at(&mut next, &paths.item_b, Value::Null);
    set_at(&mut next, &paths.item_a_dest, moved_a);
    set_at(&mut next, &paths.item_b_dest, moved_b);
    set_at(
        &mut next,
        &paths.status,
        Value::from(ExchangeStatus::Completed.as_str()),
    );
    set_at(&mut next, &paths.completed_at, server_timestamp());
    TxDecision::Commit(next)
}

fn with_owner(item: &Value, owner: &str) -> Value {
    let mut moved = item.clone();
    if let Value::Object(fields) = &mut moved {
        fields.insert(OWNER_FIELD.to_string(), Value::from(owner));
    }
    moved
}

/// Runs one exchange attempt against the store.
#[derive(Clone)]
pub struct SwapExecutor {
    store: Arc<dyn RemoteStore>,
}

impl SwapExecutor {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Loads the request, checks it, and swaps both items in one store
    /// transaction. Every store call is abandoned as soon as `cancel` fires.
    pub async fn execute(&self, request_id: &str, cancel: &CancellationToken) -> Result<()> {
        let snapshot = until_cancelled(cancel, self.store.read(&exchange_path(request_id)?))
            .await?
            .ok_or_else(|| ExchangeError::NotFound(request_id.to_string()))?;

        let (terms, status) = SwapTerms::from_snapshot(request_id, &snapshot)?;
        if status != ExchangeStatus::Pending {
            return Err(ExchangeError::AlreadyProcessed {
                id: request_id.to_string(),
                status,
            });
        }

        // Advisory: gives a precise error early. The transaction re-checks.
        let item_a = until_cancelled(cancel, self.store.read(&terms.item_a_path()?)).await?;
        if item_a.is_none() {
            return Err(ExchangeError::ItemNotFound {
                party: terms.party_a.clone(),
                item: terms.item_a,
            });
        }
        let item_b = until_cancelled(cancel, self.store.read(&terms.item_b_path()?)).await?;
        if item_b.is_none() {
            return Err(ExchangeError::ItemNotFound {
                party: terms.party_b.clone(),
                item: terms.item_b,
            });
        }

        if cancel.is_cancelled() {
            return Err(ExchangeError::Cancelled);
        }

        let paths = SwapPaths::new(&terms)?;
        let update = |root: &Value| plan_swap(root, &paths, &terms);
        let outcome = until_cancelled(cancel, self.store.transact(&StorePath::root(), &update)).await;

        match outcome {
            Ok(TxOutcome::Committed(_)) => {
                tracing::info!(
                    "Exchange {} completed: item {} -> {}, item {} -> {}",
                    request_id,
                    terms.item_a,
                    terms.party_b,
                    terms.item_b,
                    terms.party_a
                );
                Ok(())
            }
            Ok(TxOutcome::Aborted) => Err(ExchangeError::TransactionAborted(format!(
                "exchange {} no longer matches the stored state",
                request_id
            ))),
            Err(ExchangeError::Store(StoreError::Contention { attempts, .. })) => {
                Err(ExchangeError::TransactionAborted(format!(
                    "exchange {} lost {} consecutive races",
                    request_id, attempts
                )))
            }
            Err(err) => Err(err),
        }
    }
}
