use super::executor::SwapExecutor;
use super::guard::TimeoutGuard;
use super::inventory::Inventory;
use super::lifecycle::{CancelOutcome, RequestLifecycle};
use super::model::{ExchangeRequest, ExchangeStatus};
use super::rollback::{RollbackHandler, RollbackOutcome};
use crate::config::{AppConfig, ExchangeConfig};
use crate::error::{ExchangeError, Result};
use crate::store::{self, RemoteStore};
use crate::{ItemId, RequestId};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Entry point for creating, executing, inspecting and cancelling exchanges.
///
/// Cheap to clone; clones share the same store handle.
#[derive(Clone)]
pub struct ExchangeService {
    lifecycle: RequestLifecycle,
    inventory: Inventory,
    executor: SwapExecutor,
    guard: TimeoutGuard,
    rollback: RollbackHandler,
}

impl ExchangeService {
    pub fn new(store: Arc<dyn RemoteStore>, config: &ExchangeConfig) -> Self {
        Self::with_timeout(store, config.timeout())
    }

    pub fn with_timeout(store: Arc<dyn RemoteStore>, timeout: Duration) -> Self {
        let lifecycle = RequestLifecycle::new(store.clone());
        Self {
            rollback: RollbackHandler::new(lifecycle.clone()),
            lifecycle,
            inventory: Inventory::new(store.clone()),
            executor: SwapExecutor::new(store),
            guard: TimeoutGuard::new(timeout),
        }
    }

    /// Validates `config`, connects the configured store backend and builds
    /// a service on top of it.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let store = store::connect(&config.store).await?;
        tracing::info!(
            "Exchange service ready, deadline {}s",
            config.exchange.timeout_seconds
        );
        Ok(Self::new(store, &config.exchange))
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn timeout(&self) -> Duration {
        self.guard.deadline()
    }

    pub async fn create_exchange_request(
        &self,
        party_a: &str,
        party_b: &str,
        item_a: ItemId,
        item_b: ItemId,
    ) -> Result<RequestId> {
        self.lifecycle.create(party_a, party_b, item_a, item_b).await
    }

    pub async fn execute_exchange(&self, request_id: &str) -> Result<()> {
        self.execute_exchange_with_cancel(request_id, &CancellationToken::new())
            .await
    }

    /// Runs the exchange under the configured deadline.
    ///
    /// On any failure the request is conditionally moved out of `PENDING`
    /// (`TIMEOUT` for a missed deadline, `CANCELLED` otherwise) and the
    /// original error is returned. Compensation problems are logged only.
    ///
    /// A missed deadline whose swap turns out to have committed anyway is
    /// reported as success.
    pub async fn execute_exchange_with_cancel(
        &self,
        request_id: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        tracing::info!("Executing exchange {}", request_id);

        let result = self
            .guard
            .run(cancel, |token| async move {
                self.executor.execute(request_id, &token).await
            })
            .await;

        let Err(err) = result else {
            return Ok(());
        };
        tracing::warn!("Exchange {} failed: {}", request_id, err);

        let compensation = self.rollback.compensate(request_id, &err).await;
        if matches!(err, ExchangeError::Timeout(_))
            && compensation == RollbackOutcome::Skipped(ExchangeStatus::Completed)
        {
            tracing::warn!(
                "Exchange {} committed after its deadline, reporting success",
                request_id
            );
            return Ok(());
        }
        Err(err)
    }

    pub async fn get_exchange_by_id(&self, request_id: &str) -> Result<ExchangeRequest> {
        self.lifecycle.get(request_id).await
    }

    pub async fn cancel_exchange(&self, request_id: &str) -> Result<CancelOutcome> {
        self.lifecycle.cancel(request_id).await
    }
}
