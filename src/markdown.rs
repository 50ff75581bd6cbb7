//! Fixed markdown stamping.
//!
//! The simplest transform in the crate: one markdown snippet, written onto
//! every item under a configurable field. Typically used to inject static
//! prose (report headers, prompt preambles) into a batch before a downstream
//! transform consumes it.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::item::Item;
use crate::output::{BatchOutput, BatchStats, ItemOutcome};

/// Options for [`stamp_items`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkdownConfig {
    /// Markdown text stamped onto every item.
    pub content: String,
    /// JSON field the content is written under.
    pub output_field: String,
    /// Strip leading and trailing whitespace from the content.
    pub trim: bool,
    /// Shallow-copy the item's existing JSON into the output before stamping.
    /// The stamped field overwrites any field of the same name.
    pub keep_input: bool,
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        Self {
            content: String::new(),
            output_field: "markdown".to_string(),
            trim: true,
            keep_input: false,
        }
    }
}

/// Stamps `config.content` onto every item. Infallible: every outcome is
/// [`ItemOutcome::Text`] and `stats.failed` is always zero.
pub fn stamp_items(items: &[Item], config: &MarkdownConfig) -> BatchOutput {
    let total_start = Instant::now();

    let content = if config.trim {
        config.content.trim()
    } else {
        config.content.as_str()
    };

    let outcomes = items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let mut json = if config.keep_input {
                item.json.clone()
            } else {
                Map::new()
            };
            json.insert(
                config.output_field.clone(),
                Value::String(content.to_string()),
            );
            ItemOutcome::Text {
                index,
                item: Item::from_json_object(json),
            }
        })
        .collect::<Vec<_>>();

    let stats = BatchStats {
        total_items: items.len(),
        converted: items.len(),
        failed: 0,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    BatchOutput { outcomes, stats }
}
