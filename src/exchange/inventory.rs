use super::model::{item_path, OwnedItem, ITEMS, OWNER_FIELD};
use crate::error::{ExchangeError, Result};
use crate::store::{server_timestamp, RemoteStore, StorePath};
use crate::ItemId;
use serde_json::Value;
use std::sync::Arc;

/// Per-party item collections under `items/{party}/{itemId}`.
#[derive(Clone)]
pub struct Inventory {
    store: Arc<dyn RemoteStore>,
}

impl Inventory {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Places `item` in the collection of `party`, recording `party` as its
    /// owner. A missing `added_at` is filled in by the store clock.
    pub async fn deposit(&self, party: &str, item: OwnedItem) -> Result<()> {
        if party.is_empty() {
            return Err(ExchangeError::Validation("Party id cannot be empty".to_string()));
        }

        let item_id = item.item_id;
        let mut value = serde_json::to_value(OwnedItem {
            owner_id: party.to_string(),
            ..item
        })?;
        if let Value::Object(fields) = &mut value {
            fields.entry("addedAt").or_insert_with(server_timestamp);
        }

        self.store.write(&item_path(party, item_id)?, value).await?;
        tracing::debug!("Deposited item {} for {}", item_id, party);
        Ok(())
    }

    pub async fn withdraw(&self, party: &str, item_id: ItemId) -> Result<()> {
        self.store.write(&item_path(party, item_id)?, Value::Null).await?;
        tracing::debug!("Withdrew item {} from {}", item_id, party);
        Ok(())
    }

    pub async fn item(&self, party: &str, item_id: ItemId) -> Result<Option<OwnedItem>> {
        match self.store.read(&item_path(party, item_id)?).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Every item currently held by `party`, ordered by item id.
    pub async fn items_of(&self, party: &str) -> Result<Vec<OwnedItem>> {
        let collection = StorePath::root().join(ITEMS)?.join(party)?;
        let Some(Value::Object(entries)) = self.store.read(&collection).await? else {
            return Ok(Vec::new());
        };

        let mut items = entries
            .into_iter()
            .map(|(_, value)| serde_json::from_value::<OwnedItem>(value))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        items.sort_by_key(|item| item.item_id);
        Ok(items)
    }

    pub async fn owns(&self, party: &str, item_id: ItemId) -> Result<bool> {
        let stored = self.store.read(&item_path(party, item_id)?).await?;
        Ok(stored
            .as_ref()
            .and_then(|value| value.get(OWNER_FIELD))
            .and_then(Value::as_str)
            .map_or(stored.is_some(), |owner| owner == party))
    }
}
