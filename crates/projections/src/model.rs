//! Values served by the read path.

use common::{AggregateId, Version};
use domain::ItemState;
use serde::{Deserialize, Serialize};

/// Stock figures of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockStatus {
    pub item_id: AggregateId,
    pub sku: String,
    pub quantity: i64,
    pub reserved: i64,
    pub available: i64,
    pub version: Version,
}

impl From<&ItemState> for StockStatus {
    fn from(state: &ItemState) -> Self {
        Self {
            item_id: state.id,
            sku: state.sku.clone(),
            quantity: state.quantity,
            reserved: state.reserved,
            available: state.available,
            version: state.version,
        }
    }
}

/// One page of live items, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPage {
    pub page: u32,
    pub page_size: u32,
    pub items: Vec<ItemState>,
}
