//! Resolved item state carried by confirmations and served by the read path.

use chrono::{DateTime, Utc};
use common::{AggregateId, Version};
use item_store::ItemRecord;
use serde::{Deserialize, Serialize};

/// Full post-change state of an item as stored by the single writer.
///
/// This is the payload of every `*Confirmed` envelope and the value cached
/// under the item keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemState {
    pub id: AggregateId,
    pub sku: String,
    pub name: String,
    pub description: String,
    pub quantity: i64,
    pub reserved: i64,
    pub available: i64,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ItemState {
    /// Returns true once the item has been deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl From<&ItemRecord> for ItemState {
    fn from(record: &ItemRecord) -> Self {
        Self {
            id: record.id,
            sku: record.sku.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            quantity: record.quantity,
            reserved: record.reserved,
            available: record.available(),
            version: record.version,
            created_at: record.created_at,
            updated_at: record.updated_at,
            deleted_at: record.deleted_at,
        }
    }
}

impl From<ItemRecord> for ItemState {
    fn from(record: ItemRecord) -> Self {
        Self::from(&record)
    }
}
