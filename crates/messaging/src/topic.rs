//! Topics of the inventory event log, partitioned by business concern.

use serde::{Deserialize, Serialize};

/// A topic on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    /// Item creation, detail updates and deletion.
    #[serde(rename = "inventory.item-lifecycle")]
    ItemLifecycle,

    /// Stock adjustments, reservations, releases and fulfilments.
    #[serde(rename = "inventory.stock-mutation")]
    StockMutation,

    /// Confirmations emitted by the single writer after a durable apply.
    #[serde(rename = "inventory.confirmed")]
    Confirmed,

    /// Envelopes the single writer could not apply.
    #[serde(rename = "inventory.dead-letter")]
    DeadLetter,
}

impl Topic {
    /// Every topic the system uses.
    pub const ALL: [Topic; 4] = [
        Topic::ItemLifecycle,
        Topic::StockMutation,
        Topic::Confirmed,
        Topic::DeadLetter,
    ];

    /// Topics carrying command-time envelopes consumed by the single writer.
    pub const COMMANDS: [Topic; 2] = [Topic::ItemLifecycle, Topic::StockMutation];

    /// Returns the broker-level topic name.
    pub fn name(&self) -> &'static str {
        match self {
            Topic::ItemLifecycle => "inventory.item-lifecycle",
            Topic::StockMutation => "inventory.stock-mutation",
            Topic::Confirmed => "inventory.confirmed",
            Topic::DeadLetter => "inventory.dead-letter",
        }
    }

    /// Looks a topic up by its broker-level name.
    pub fn from_name(name: &str) -> Option<Topic> {
        Topic::ALL.into_iter().find(|t| t.name() == name)
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
