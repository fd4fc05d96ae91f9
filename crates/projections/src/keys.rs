//! Cache key layout.

use common::AggregateId;

/// Prefix shared by every list page key.
pub const LIST_PREFIX: &str = "items:list:";

/// Prefixes covering every key the read side writes.
pub const ALL_PREFIXES: [&str; 3] = ["item:", "stock:", LIST_PREFIX];

pub fn item_key(id: AggregateId) -> String {
    format!("item:id:{id}")
}

pub fn sku_key(sku: &str) -> String {
    format!("item:sku:{sku}")
}

pub fn stock_key(id: AggregateId) -> String {
    format!("stock:{id}")
}

pub fn list_key(page: u32, page_size: u32) -> String {
    format!("{LIST_PREFIX}{page}:{page_size}")
}
