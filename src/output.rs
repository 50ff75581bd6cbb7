//! Output types: per-item outcomes and whole-run statistics.
//!
//! A batch run never hides partial failure. Every input item produces
//! exactly one [`ItemOutcome`] at the same position, and the variant says
//! what happened: converted text, converted binary, or a typed error. The
//! caller decides whether a failure is fatal; these types just report.

use crate::error::ItemError;
use crate::item::Item;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What became of one input item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ItemOutcome {
    /// Conversion succeeded and the target format is text. The converted
    /// content sits in the item's JSON under the configured output field.
    Text { index: usize, item: Item },

    /// Conversion succeeded and the target format is binary. The produced
    /// bytes sit in the item's attachments under the configured property.
    Binary { index: usize, item: Item },

    /// This item failed; the rest of the batch may still have succeeded.
    Failed { index: usize, error: ItemError },
}

impl ItemOutcome {
    /// Zero-based position of the originating input item.
    pub fn index(&self) -> usize {
        match self {
            ItemOutcome::Text { index, .. }
            | ItemOutcome::Binary { index, .. }
            | ItemOutcome::Failed { index, .. } => *index,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ItemOutcome::Failed { .. })
    }

    /// The produced item, if this outcome is a success.
    pub fn item(&self) -> Option<&Item> {
        match self {
            ItemOutcome::Text { item, .. } | ItemOutcome::Binary { item, .. } => Some(item),
            ItemOutcome::Failed { .. } => None,
        }
    }

    /// The error, if this outcome is a failure.
    pub fn error(&self) -> Option<&ItemError> {
        match self {
            ItemOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Collapse into a plain item. Failures become `{"error": "<message>"}`
    /// so a stream of outcomes can be rendered as a uniform item list.
    pub fn into_item(self) -> Item {
        match self {
            ItemOutcome::Text { item, .. } | ItemOutcome::Binary { item, .. } => item,
            ItemOutcome::Failed { error, .. } => {
                let mut json = Map::new();
                json.insert("error".to_string(), Value::String(error.to_string()));
                Item::from_json_object(json)
            }
        }
    }
}

/// Everything a batch run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutput {
    /// One outcome per input item, in input order.
    pub outcomes: Vec<ItemOutcome>,
    /// Aggregate statistics for the run.
    pub stats: BatchStats,
}

impl BatchOutput {
    /// Iterate over the successfully produced items.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.outcomes.iter().filter_map(|o| o.item())
    }

    /// Iterate over the per-item errors.
    pub fn failures(&self) -> impl Iterator<Item = &ItemError> {
        self.outcomes.iter().filter_map(|o| o.error())
    }

    /// Collapse every outcome into a plain item (failures become
    /// `{"error": …}` items), consuming the output.
    pub fn into_items(self) -> Vec<Item> {
        self.outcomes.into_iter().map(ItemOutcome::into_item).collect()
    }
}

/// Aggregate statistics for one batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    /// Number of items in the input batch.
    pub total_items: usize,
    /// Items that converted successfully.
    pub converted: usize,
    /// Items that failed.
    pub failed: usize,
    /// Wall-clock duration of the whole run, milliseconds.
    pub total_duration_ms: u64,
}
