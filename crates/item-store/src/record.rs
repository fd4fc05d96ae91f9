use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AggregateId, Version};

/// One row of the authoritative store.
///
/// `available` is never stored; it is derived from `quantity` and `reserved`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: AggregateId,
    pub sku: String,
    pub name: String,
    pub description: String,
    pub quantity: i64,
    pub reserved: i64,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ItemRecord {
    /// Units not held by a reservation.
    pub fn available(&self) -> i64 {
        self.quantity - self.reserved
    }

    /// Returns true once the item has been deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Returns the name of the first stock invariant the row breaks, if any.
    pub fn violated_constraint(&self) -> Option<&'static str> {
        if self.quantity < 0 {
            Some("quantity >= 0")
        } else if self.reserved < 0 {
            Some("reserved >= 0")
        } else if self.reserved > self.quantity {
            Some("reserved <= quantity")
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(quantity: i64, reserved: i64) -> ItemRecord {
        let now = Utc::now();
        ItemRecord {
            id: AggregateId::new(),
            sku: "SKU-1".to_string(),
            name: "Widget".to_string(),
            description: String::new(),
            quantity,
            reserved,
            version: Version::first(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn available_is_derived() {
        assert_eq!(record(100, 30).available(), 70);
    }

    #[test]
    fn constraint_checks() {
        assert_eq!(record(10, 0).violated_constraint(), None);
        assert_eq!(record(-1, 0).violated_constraint(), Some("quantity >= 0"));
        assert_eq!(record(5, -1).violated_constraint(), Some("reserved >= 0"));
        assert_eq!(
            record(5, 6).violated_constraint(),
            Some("reserved <= quantity")
        );
    }
}
