//! Streaming conversion API: emit outcomes as items complete.
//!
//! ## Why stream?
//!
//! Large batches take minutes; each item holds a converter process for up to
//! the configured timeout. A streams-based API lets callers forward results
//! downstream, update progress bars, or persist outcomes incrementally
//! instead of buffering the entire batch in memory.
//!
//! Unlike the eager [`crate::convert::convert_items`] which returns only
//! after all items finish, [`convert_stream`] yields one result per item as
//! it completes. Items are processed strictly in input order, so results
//! arrive in order too.

use crate::config::ConvertConfig;
use crate::convert::{convert_one, RunSetup};
use crate::error::ItemError;
use crate::item::Item;
use crate::output::ItemOutcome;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of per-item results.
pub type OutcomeStream = Pin<Box<dyn Stream<Item = Result<ItemOutcome, ItemError>> + Send>>;

/// Convert a batch of items, streaming each outcome as it is ready.
///
/// Per-item failures arrive as `Err(ItemError)` elements; the stream itself
/// always runs to the end of the input. The eager API's
/// `continue_on_failure` policy does not apply here — a consumer that wants
/// fail-fast behaviour simply stops consuming after the first `Err`, which
/// also cancels the in-flight item and cleans up its temp files.
///
/// # Example
/// ```rust,no_run
/// use docmill::{convert_stream, ConvertConfig, Item};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let items: Vec<Item> = serde_json::from_str(r#"[{"html": "<p>hi</p>"}]"#)?;
/// let config = ConvertConfig::builder()
///     .text_field("html")
///     .from_format("html")
///     .build()?;
/// let mut outcomes = convert_stream(items, &config);
/// while let Some(result) = outcomes.next().await {
///     match result {
///         Ok(outcome) => println!("item {} done", outcome.index()),
///         Err(e) => eprintln!("item {} failed: {e}", e.index()),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn convert_stream(items: Vec<Item>, config: &ConvertConfig) -> OutcomeStream {
    info!("Starting streaming conversion: {} items", items.len());

    // ── Resolve run-level values once ────────────────────────────────────
    let setup = Arc::new(RunSetup::from_config(config));
    let config = Arc::new(config.clone());

    // ── Build the stream: sequential, in input order ─────────────────────
    let s = stream::iter(items.into_iter().enumerate()).then(move |(index, item)| {
        let setup = Arc::clone(&setup);
        let config = Arc::clone(&config);
        async move { convert_one(&item, index, &config, &setup).await }
    });

    Box::pin(s)
}
