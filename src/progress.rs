//! Progress-observer trait for per-item batch events.
//!
//! Inject an [`Arc<dyn BatchProgress>`] via
//! [`crate::config::ConvertConfigBuilder::progress`] to receive real-time
//! events as the batch works through its items.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a Tokio broadcast channel, a WebSocket, a database record,
//! or a terminal progress bar — without the library knowing anything about how
//! the host application communicates. The trait is `Send + Sync` so the same
//! observer can also serve pipelines that fan items out across tasks.
//!
//! # Example
//!
//! ```rust
//! use docmill::{BatchProgress, ConvertConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingObserver {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl BatchProgress for CountingObserver {
//!     fn on_item_complete(&self, index: usize, total_items: usize, output_len: usize) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("Item {}/{} done ({} bytes)", index + 1, total_items, output_len);
//!     }
//! }
//!
//! let counter = Arc::new(CountingObserver {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ConvertConfig::builder()
//!     .progress(counter as Arc<dyn BatchProgress>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch orchestrator as it works through the items.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Item events arrive in input order; a fail-fast run
/// stops emitting after the first `on_item_error`.
pub trait BatchProgress: Send + Sync {
    /// Called once before the first item is staged.
    ///
    /// # Arguments
    /// * `total_items` — number of items in the batch
    fn on_run_start(&self, total_items: usize) {
        let _ = total_items;
    }

    /// Called just before an item's converter process is spawned.
    ///
    /// # Arguments
    /// * `index`       — 0-indexed item position
    /// * `total_items` — items in the batch
    fn on_item_start(&self, index: usize, total_items: usize) {
        let _ = (index, total_items);
    }

    /// Called when an item converts successfully.
    ///
    /// # Arguments
    /// * `index`       — 0-indexed item position
    /// * `total_items` — items in the batch
    /// * `output_len`  — byte length of the produced document
    ///   (useful for progress bars that track output size)
    fn on_item_complete(&self, index: usize, total_items: usize, output_len: usize) {
        let _ = (index, total_items, output_len);
    }

    /// Called when an item fails.
    ///
    /// # Arguments
    /// * `index`       — 0-indexed item position
    /// * `total_items` — items in the batch
    /// * `error`       — human-readable error description
    fn on_item_error(&self, index: usize, total_items: usize, error: &str) {
        let _ = (index, total_items, error);
    }

    /// Called once after the run ends, whether it completed or aborted.
    ///
    /// # Arguments
    /// * `total_items`   — items in the batch
    /// * `success_count` — items that converted without error
    fn on_run_complete(&self, total_items: usize, success_count: usize) {
        let _ = (total_items, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no observer is configured.
pub struct NoopProgress;

impl BatchProgress for NoopProgress {}

/// Convenience alias matching the type stored in [`crate::config::ConvertConfig`].
pub type ProgressObserver = Arc<dyn BatchProgress>;
