//! # docmill
//!
//! Batch document conversion and LLM data plumbing: a local pandoc does the
//! format work, DashScope (Qwen) does the model work, and this crate does
//! everything around them.
//!
//! ## Why this crate?
//!
//! Format conversion is a solved problem — pandoc already reads and writes
//! more formats than any library binding ever will. What keeps going wrong
//! in automation pipelines is everything around the converter: staging bytes
//! to disk safely, quoting argv, enforcing timeouts, cleaning up temp files
//! on every exit path, and deciding what one bad item does to the other
//! ninety-nine. This crate owns that middle layer. Items go in as JSON plus
//! binary attachments, outcomes come out in input order, and the same batch
//! discipline extends to the sibling transforms (chat completion,
//! transcription, markdown stamping, TOON encoding) that typically surround
//! a conversion step.
//!
//! ## Pipeline Overview
//!
//! ```text
//! items
//!  │
//!  ├─ 1. Format   resolve logical format ids (extension, CLI token, binary?)
//!  ├─ 2. Stage    write source bytes to a temp file, reserve the output slot
//!  ├─ 3. Invoke   spawn the converter with literal argv tokens and a timeout
//!  └─ 4. Resolve  read the produced file back into a Text/Binary outcome
//! ```
//!
//! Every stage cleans up after itself: for each item exactly two temp paths
//! are claimed, and neither exists once the item's outcome is decided —
//! success, converter failure, timeout, and staging failure alike.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docmill::{convert_items, ConvertConfig, Item};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut item = Item::new();
//!     item.set_field("text", "# Hello".into());
//!
//!     // pandoc found on PATH, or set PANDOC_PATH / .executable(...)
//!     let config = ConvertConfig::builder()
//!         .text_field("text")
//!         .from_format("markdown")
//!         .to_format("html")
//!         .build()?;
//!
//!     let output = convert_items(&[item], &config).await?;
//!     for outcome in &output.outcomes {
//!         if let Some(item) = outcome.item() {
//!             println!("{}", item.text_field("text").unwrap_or_default());
//!         }
//!     }
//!     eprintln!(
//!         "{}/{} items, {}ms",
//!         output.stats.converted, output.stats.total_items, output.stats.total_duration_ms
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docmill` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! docmill = { version = "0.3", default-features = false }
//! ```
//!
//! ## Transforms
//!
//! | Transform | Entry point | Shape |
//! |-----------|-------------|-------|
//! | Document conversion | [`convert_items`] / [`convert_stream`] | one outcome per item |
//! | Chat completion | [`chat_items`] | `{response, model, usage}` per item |
//! | Transcription | [`transcribe_items`] | `{text, model, usage}` per item |
//! | Markdown stamping | [`stamp_items`] | stamped field per item |
//! | TOON encode / decode | [`encode_items`] / [`decode_text`] | whole batch ⇄ one item |
//!
//! The per-item transforms share one failure policy: fail fast by default,
//! or record a `Failed` outcome per bad item with continue-on-failure.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod dashscope;
pub mod error;
pub mod item;
pub mod markdown;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;
pub mod toon;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConvertConfig, ConvertConfigBuilder, InputSelector};
pub use convert::convert_items;
pub use dashscope::chat::{chat_items, ChatConfig, ContextSpec, MessageSource};
pub use dashscope::transcribe::{transcribe_items, AudioSource, TranscribeConfig};
pub use dashscope::DashScopeClient;
pub use error::{ApiError, DocmillError, ItemError, ToonError};
pub use item::{items_from_value, Attachment, Item};
pub use markdown::{stamp_items, MarkdownConfig};
pub use output::{BatchOutput, BatchStats, ItemOutcome};
pub use progress::{BatchProgress, NoopProgress, ProgressObserver};
pub use stream::{convert_stream, OutcomeStream};
pub use toon::{decode_text, encode_items, ToonDecodeConfig, ToonEncodeConfig};
