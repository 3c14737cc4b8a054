use crate::error::{ExchangeError, Result};
use crate::store::{StoreError, StorePath};
use crate::{ItemId, PartyId, RequestId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub const EXCHANGES: &str = "exchanges";
pub const ITEMS: &str = "items";
pub const STATUS_FIELD: &str = "status";
pub const OWNER_FIELD: &str = "ownerId";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExchangeStatus {
    Pending,
    Completed,
    Cancelled,
    Timeout,
}

impl ExchangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeStatus::Pending => "PENDING",
            ExchangeStatus::Completed => "COMPLETED",
            ExchangeStatus::Cancelled => "CANCELLED",
            ExchangeStatus::Timeout => "TIMEOUT",
        }
    }

    /// Every status except `Pending` is final.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExchangeStatus::Pending)
    }
}

impl fmt::Display for ExchangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeStatus {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(ExchangeStatus::Pending),
            "COMPLETED" => Ok(ExchangeStatus::Completed),
            "CANCELLED" => Ok(ExchangeStatus::Cancelled),
            "TIMEOUT" => Ok(ExchangeStatus::Timeout),
            other => Err(ExchangeError::MalformedRequest(format!(
                "unknown status '{}'",
                other
            ))),
        }
    }
}

/// A barter request as stored under `exchanges/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRequest {
    pub id: RequestId,
    pub party_a_id: PartyId,
    pub party_b_id: PartyId,
    pub item_a_id: ItemId,
    pub item_b_id: ItemId,
    pub status: ExchangeStatus,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl ExchangeRequest {
    /// Best-effort decoding for display.
    ///
    /// Missing fields fall back to empty values and an unreadable status shows
    /// as `Pending`. Nothing that decides whether a swap may run uses this.
    pub fn from_snapshot_lenient(id: &str, snapshot: &Value) -> Self {
        let text = |field: &str| {
            snapshot
                .get(field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let number = |field: &str| snapshot.get(field).and_then(Value::as_u64).unwrap_or(0);

        let status = snapshot
            .get(STATUS_FIELD)
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse::<ExchangeStatus>().ok())
            .unwrap_or(ExchangeStatus::Pending);

        let stored_id = text("id");
        Self {
            id: if stored_id.is_empty() { id.to_string() } else { stored_id },
            party_a_id: text("partyAId"),
            party_b_id: text("partyBId"),
            item_a_id: number("itemAId"),
            item_b_id: number("itemBId"),
            status,
            created_at: snapshot.get("createdAt").and_then(Value::as_i64).unwrap_or(0),
            completed_at: snapshot.get("completedAt").and_then(Value::as_i64),
        }
    }
}

/// An item as stored under `items/{ownerId}/{itemId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedItem {
    pub item_id: ItemId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<i64>,
    pub owner_id: PartyId,
}

impl OwnedItem {
    pub fn new(item_id: ItemId, name: impl Into<String>, owner_id: impl Into<PartyId>) -> Self {
        Self {
            item_id,
            name: name.into(),
            image_url: None,
            added_at: None,
            owner_id: owner_id.into(),
        }
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }
}

/// The fields of a request the swap needs, decoded strictly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapTerms {
    pub request_id: RequestId,
    pub party_a: PartyId,
    pub party_b: PartyId,
    pub item_a: ItemId,
    pub item_b: ItemId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StrictRecord {
    party_a_id: Option<PartyId>,
    party_b_id: Option<PartyId>,
    item_a_id: Option<ItemId>,
    item_b_id: Option<ItemId>,
    status: Option<String>,
}

impl SwapTerms {
    /// Decodes a stored request, failing on any missing or unreadable field.
    /// The status is never defaulted.
    pub fn from_snapshot(request_id: &str, snapshot: &Value) -> Result<(Self, ExchangeStatus)> {
        let record: StrictRecord = serde_json::from_value(snapshot.clone())
            .map_err(|e| ExchangeError::MalformedRequest(format!("{}: {}", request_id, e)))?;

        let missing =
            |field: &str| ExchangeError::MalformedRequest(format!("{}: missing {}", request_id, field));

        let terms = Self {
            request_id: request_id.to_string(),
            party_a: record.party_a_id.ok_or_else(|| missing("partyAId"))?,
            party_b: record.party_b_id.ok_or_else(|| missing("partyBId"))?,
            item_a: record.item_a_id.ok_or_else(|| missing("itemAId"))?,
            item_b: record.item_b_id.ok_or_else(|| missing("itemBId"))?,
        };
        let status = record
            .status
            .ok_or_else(|| missing("status"))?
            .parse::<ExchangeStatus>()?;

        if terms.party_a.is_empty() || terms.party_b.is_empty() {
            return Err(ExchangeError::MalformedRequest(format!(
                "{}: empty party id",
                request_id
            )));
        }
        if terms.party_a == terms.party_b {
            return Err(ExchangeError::MalformedRequest(format!(
                "{}: both sides belong to {}",
                request_id, terms.party_a
            )));
        }

        Ok((terms, status))
    }

    pub fn request_path(&self) -> std::result::Result<StorePath, StoreError> {
        exchange_path(&self.request_id)
    }

    pub fn item_a_path(&self) -> std::result::Result<StorePath, StoreError> {
        item_path(&self.party_a, self.item_a)
    }

    pub fn item_b_path(&self) -> std::result::Result<StorePath, StoreError> {
        item_path(&self.party_b, self.item_b)
    }
}

pub fn exchanges_root() -> std::result::Result<StorePath, StoreError> {
    StorePath::root().join(EXCHANGES)
}

pub fn exchange_path(id: &str) -> std::result::Result<StorePath, StoreError> {
    exchanges_root()?.join(id)
}

pub fn item_path(party: &str, item: ItemId) -> std::result::Result<StorePath, StoreError> {
    StorePath::root().join(ITEMS)?.join(party)?.join(item)
}
