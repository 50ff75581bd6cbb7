//! Eager (whole-batch) conversion entry points.
//!
//! ## Why eager vs. streaming?
//!
//! This module provides the simpler API: work through every item, then
//! return. It collects every [`ItemOutcome`] into memory together with run
//! statistics. Use [`crate::stream::convert_stream`] instead when you want
//! outcomes progressively, e.g. to forward results downstream while a long
//! batch is still converting.
//!
//! Items are processed strictly in input order, one converter process at a
//! time. The converter is an external executable; running several instances
//! concurrently mostly trades I/O contention for no latency win, and ordered
//! processing keeps outcome positions trivially aligned with input positions.

use crate::config::ConvertConfig;
use crate::error::{DocmillError, ItemError};
use crate::item::Item;
use crate::output::{BatchOutput, BatchStats, ItemOutcome};
use crate::pipeline::format::{self, FormatClass};
use crate::pipeline::{invoke, resolve, stage};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Run-level values resolved once, shared by every item.
pub(crate) struct RunSetup {
    /// `-f` token, already normalised (`None` ⇒ converter auto-detects).
    pub(crate) from_token: Option<String>,
    /// Target format classification: `-t` token, staged extension,
    /// binary/text decision.
    pub(crate) to_class: FormatClass,
    /// Extra converter arguments, tokenised.
    pub(crate) extra_args: Vec<String>,
    /// Directory receiving staged temp files.
    pub(crate) temp_dir: PathBuf,
}

impl RunSetup {
    pub(crate) fn from_config(config: &ConvertConfig) -> Self {
        Self {
            from_token: config
                .from_format
                .as_deref()
                .and_then(|f| format::input_cli_token(f).map(str::to_string)),
            to_class: format::resolve(&config.to_format),
            extra_args: invoke::split_extra_args(&config.extra_args),
            temp_dir: config
                .temp_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
        }
    }
}

/// Convert a batch of items with an external converter.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `items`  — Input items; each contributes exactly one outcome
/// * `config` — Conversion configuration
///
/// # Returns
/// `Ok(BatchOutput)` with one outcome per input item, in input order. With
/// `continue_on_failure` enabled this includes `Failed` outcomes (check
/// `output.stats.failed`).
///
/// # Errors
/// Returns `Err(DocmillError)` when `continue_on_failure` is disabled and an
/// item fails: the first failure aborts the run and is propagated; items
/// after it are never attempted. Temp files of the failed item are already
/// cleaned up when this returns.
pub async fn convert_items(
    items: &[Item],
    config: &ConvertConfig,
) -> Result<BatchOutput, DocmillError> {
    let total_start = Instant::now();
    let total_items = items.len();
    info!(
        "Starting batch conversion: {} items -> {}",
        total_items, config.to_format
    );

    // ── Step 1: Resolve run-level values once ────────────────────────────
    let setup = RunSetup::from_config(config);
    debug!(
        "Converter {:?}, from {:?}, to {} ({}), temp dir {:?}",
        config.executable,
        setup.from_token,
        setup.to_class.cli_token,
        if setup.to_class.binary_output { "binary" } else { "text" },
        setup.temp_dir
    );

    if let Some(ref observer) = config.progress {
        observer.on_run_start(total_items);
    }

    // ── Step 2: Drive items strictly in input order ──────────────────────
    let mut outcomes: Vec<ItemOutcome> = Vec::with_capacity(total_items);
    let mut converted = 0usize;
    for (index, item) in items.iter().enumerate() {
        if let Some(ref observer) = config.progress {
            observer.on_item_start(index, total_items);
        }
        match convert_one(item, index, config, &setup).await {
            Ok(outcome) => {
                converted += 1;
                if let Some(ref observer) = config.progress {
                    observer.on_item_complete(index, total_items, output_len(&outcome, config));
                }
                outcomes.push(outcome);
            }
            Err(error) => {
                warn!("Item {} failed: {}", index, error);
                if let Some(ref observer) = config.progress {
                    observer.on_item_error(index, total_items, &error.to_string());
                }
                if config.continue_on_failure {
                    outcomes.push(ItemOutcome::Failed { index, error });
                } else {
                    // Fail-fast: the run ends here; remaining items are
                    // never attempted.
                    if let Some(ref observer) = config.progress {
                        observer.on_run_complete(total_items, converted);
                    }
                    return Err(error.into());
                }
            }
        }
    }

    // ── Step 3: Compute stats ────────────────────────────────────────────
    let failed = outcomes.iter().filter(|o| o.is_failure()).count();
    let stats = BatchStats {
        total_items,
        converted,
        failed,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Batch complete: {}/{} items, {}ms total",
        converted, total_items, stats.total_duration_ms
    );

    if let Some(ref observer) = config.progress {
        observer.on_run_complete(total_items, converted);
    }

    Ok(BatchOutput { outcomes, stats })
}

/// Convert a single item end to end: stage, invoke, resolve.
///
/// Both staged temp files are deleted when this returns, on the success and
/// every failure path alike; their guards live on this function's stack and
/// `?` unwinds through them.
pub(crate) async fn convert_one(
    item: &Item,
    index: usize,
    config: &ConvertConfig,
    setup: &RunSetup,
) -> Result<ItemOutcome, ItemError> {
    // ── Step 1: Stage input and reserve the output path ──────────────────
    let (staged_input, staged_output) = stage::stage(
        item,
        index,
        &config.input,
        config.from_format.as_deref(),
        &setup.to_class.extension,
        &setup.temp_dir,
    )
    .await?;
    debug!(
        "item {}: staged {} bytes at {:?}",
        index,
        staged_input.byte_length(),
        staged_input.path()
    );

    // ── Step 2: Run the converter ─────────────────────────────────────────
    let args = invoke::build_args(
        setup.from_token.as_deref(),
        &setup.to_class.cli_token,
        &setup.extra_args,
        staged_input.path(),
        staged_output.path(),
    );
    invoke::invoke(&config.executable, &args, config.timeout, index).await?;

    // ── Step 3: Read the produced file back ───────────────────────────────
    let shape = resolve::OutputShape {
        field: &config.output_field,
        property: &config.output_property,
        passthrough: config.passthrough,
    };
    resolve::resolve_output(staged_output.path(), &setup.to_class, item, index, &shape).await
}

/// Byte length of the produced document, for progress reporting.
fn output_len(outcome: &ItemOutcome, config: &ConvertConfig) -> usize {
    match outcome {
        ItemOutcome::Text { item, .. } => {
            item.text_field(&config.output_field).map_or(0, str::len)
        }
        ItemOutcome::Binary { item, .. } => item
            .attachment(&config.output_property)
            .map_or(0, |a| a.data.len()),
        ItemOutcome::Failed { .. } => 0,
    }
}
