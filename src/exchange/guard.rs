use crate::error::{ExchangeError, Result};
use crate::store::StoreError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Bounds an exchange attempt by a wall-clock deadline.
///
/// The operation gets a child of the caller's token. When the deadline passes
/// the child is cancelled and the operation future is dropped, so it cannot
/// issue any further store calls.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutGuard {
    deadline: Duration,
}

impl TimeoutGuard {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub async fn run<T, F, Fut>(&self, parent: &CancellationToken, op: F) -> Result<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let token = parent.child_token();
        let _cancel_on_exit = token.clone().drop_guard();

        match tokio::time::timeout(self.deadline, op(token.clone())).await {
            Ok(result) => result,
            Err(_) => {
                token.cancel();
                tracing::warn!("Exchange attempt exceeded its {:?} deadline", self.deadline);
                Err(ExchangeError::Timeout(self.deadline))
            }
        }
    }
}

/// Awaits one store call unless `cancel` fires first.
pub(crate) async fn until_cancelled<T, F>(cancel: &CancellationToken, call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, StoreError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ExchangeError::Cancelled),
        result = call => result.map_err(ExchangeError::from),
    }
}
