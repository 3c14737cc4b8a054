use crate::exchange::model::ExchangeStatus;
use crate::store::StoreError;
use crate::{ItemId, PartyId, RequestId};
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExchangeError>;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Exchange request not found: {0}")]
    NotFound(RequestId),

    #[error("Malformed exchange request: {0}")]
    MalformedRequest(String),

    #[error("Exchange {id} already processed (status {status})")]
    AlreadyProcessed { id: RequestId, status: ExchangeStatus },

    #[error("Item {item} not found in collection of {party}")]
    ItemNotFound { party: PartyId, item: ItemId },

    #[error("Swap transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("Exchange timed out after {0:?}")]
    Timeout(Duration),

    #[error("Exchange cancelled before completion")]
    Cancelled,

    #[error("Rollback failed: {0}")]
    RollbackFailed(String),

    #[error("Could not allocate exchange id: {0}")]
    AllocationFailed(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl ExchangeError {
    /// Short text a front end can show for this failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            ExchangeError::Timeout(_) => "The exchange took too long. Please try again.",
            ExchangeError::AlreadyProcessed { .. } | ExchangeError::TransactionAborted(_) => {
                "This exchange is no longer available."
            }
            ExchangeError::NotFound(_) => "This exchange does not exist.",
            ExchangeError::ItemNotFound { .. } => "One of the items is no longer owned by its trader.",
            ExchangeError::Cancelled => "The exchange was cancelled.",
            _ => "The exchange could not be completed.",
        }
    }

    /// Whether running the same operation again could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExchangeError::Timeout(_) | ExchangeError::Store(StoreError::Unavailable(_))
        )
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for ExchangeError {
    fn from(err: std::io::Error) -> Self {
        ExchangeError::Io(err.to_string())
    }
}
