//! Error types for the docmill library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`DocmillError`] — **Fatal**: the whole run cannot proceed
//!   (invalid configuration, or the first item error when a batch runs in
//!   fail-fast mode). Returned as `Err(DocmillError)` from the top-level
//!   batch functions.
//!
//! * [`ItemError`] — **Non-fatal per item**: one item of the batch failed
//!   (empty payload, converter timeout, non-zero exit) while the others are
//!   fine. Stored inside [`crate::output::ItemOutcome::Failed`] when the run
//!   is in continue-on-failure mode, so callers can inspect partial success
//!   instead of losing a hundred-item batch to one bad item.
//!
//! Whether an [`ItemError`] stays non-fatal is decided in exactly one place,
//! the batch orchestrator: with continue-on-failure off it is converted into
//! `DocmillError::Item` and aborts the run.
//!
//! Two further types cover the remote and codec corners: [`ApiError`] for the
//! DashScope HTTP client and [`ToonError`] for TOON decoding. Batch transforms
//! fold both into [`ItemError`] so failure records stay uniform.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the docmill library.
///
/// Item-level failures use [`ItemError`] and are stored in
/// [`crate::output::ItemOutcome`] rather than propagated here, unless the
/// batch runs in fail-fast mode.
#[derive(Debug, Error)]
pub enum DocmillError {
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An item failed and the run is in fail-fast mode.
    #[error(transparent)]
    Item(#[from] ItemError),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single batch item.
///
/// Carries the index of the originating item so a failure record can be
/// placed at the item's position in the output sequence. Serialisable so
/// failure records survive a trip through JSON output.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    // ── Staging ───────────────────────────────────────────────────────────
    /// The named binary attachment does not exist on the item.
    #[error("Item {index}: no binary attachment named '{property}'\nUpstream must provide it, or point input at a different property.")]
    AttachmentMissing { index: usize, property: String },

    /// The named JSON field does not exist or is not a string.
    #[error("Item {index}: field '{field}' is missing or not a string")]
    FieldMissing { index: usize, field: String },

    /// The input payload (attachment bytes or inline text) is empty.
    #[error("Item {index}: input payload is empty")]
    EmptySource { index: usize },

    /// Could not write the staged input file.
    #[error("Item {index}: failed to stage input: {detail}")]
    StageFailed { index: usize, detail: String },

    // ── Invocation ────────────────────────────────────────────────────────
    /// The converter executable could not be spawned at all.
    #[error("Item {index}: failed to run converter '{executable}': {detail}\nCheck the executable is installed and on PATH, or set PANDOC_PATH.")]
    SpawnFailed {
        index: usize,
        executable: PathBuf,
        detail: String,
    },

    /// The converter exceeded the wall-clock timeout and was killed.
    #[error("Item {index}: converter timed out after {elapsed_ms}ms\nRaise the timeout for large documents.")]
    Timeout { index: usize, elapsed_ms: u64 },

    /// The converter exited with a non-zero status (or was killed by a signal).
    #[error("Item {index}: converter exited with status {}: {stderr}", .exit_code.map(|c| c.to_string()).unwrap_or_else(|| "killed by signal".to_string()))]
    NonZeroExit {
        index: usize,
        exit_code: Option<i32>,
        stderr: String,
    },

    // ── Output ────────────────────────────────────────────────────────────
    /// The converter exited cleanly but the output file cannot be read.
    #[error("Item {index}: converter produced no readable output: {detail}")]
    MissingOutput { index: usize, detail: String },

    // ── Remote transforms ─────────────────────────────────────────────────
    /// A DashScope call failed for this item.
    #[error("Item {index}: {detail}")]
    Api { index: usize, detail: String },

    // ── Codec transforms ──────────────────────────────────────────────────
    /// TOON text carried by this item could not be decoded.
    #[error("Item {index}: {detail}")]
    Decode { index: usize, detail: String },
}

impl ItemError {
    /// Index of the item this error is attributed to.
    pub fn index(&self) -> usize {
        match self {
            ItemError::AttachmentMissing { index, .. }
            | ItemError::FieldMissing { index, .. }
            | ItemError::EmptySource { index }
            | ItemError::StageFailed { index, .. }
            | ItemError::SpawnFailed { index, .. }
            | ItemError::Timeout { index, .. }
            | ItemError::NonZeroExit { index, .. }
            | ItemError::MissingOutput { index, .. }
            | ItemError::Api { index, .. }
            | ItemError::Decode { index, .. } => *index,
        }
    }

    /// Wrap an [`ApiError`] as a per-item failure.
    pub(crate) fn from_api(index: usize, err: ApiError) -> Self {
        ItemError::Api {
            index,
            detail: err.to_string(),
        }
    }

    /// Wrap a [`ToonError`] as a per-item failure.
    pub(crate) fn from_toon(index: usize, err: ToonError) -> Self {
        ItemError::Decode {
            index,
            detail: err.to_string(),
        }
    }
}

/// Errors from the DashScope HTTP client.
///
/// Carries no item index — the batch transforms attach one via
/// [`ItemError::Api`] when a call fails inside a batch.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No API key was configured and DASHSCOPE_API_KEY is unset.
    #[error("DashScope API key is not configured.\nPass one explicitly or set DASHSCOPE_API_KEY.")]
    MissingApiKey,

    /// The request could not be sent or the response not received.
    #[error("DashScope request failed: {0}")]
    Request(String),

    /// The request exceeded the client timeout.
    #[error("DashScope request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The server answered with a non-success HTTP status.
    #[error("DashScope returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not have the expected shape.
    #[error("Unexpected DashScope response: {detail}")]
    MalformedResponse { detail: String },
}

/// Errors from decoding TOON text.
///
/// Encoding is total over JSON values and has no error type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToonError {
    /// The input violates the TOON grammar.
    #[error("TOON syntax error on line {line}: {detail}")]
    Syntax { line: usize, detail: String },

    /// A declared array length does not match the rows present (strict mode).
    #[error("TOON length mismatch on line {line}: header declares {declared}, found {actual}")]
    LengthMismatch {
        line: usize,
        declared: usize,
        actual: usize,
    },

    /// A tabular row has a different field count than its header (strict mode).
    #[error("TOON row width mismatch on line {line}: header has {header} fields, row has {row}")]
    RowWidth {
        line: usize,
        header: usize,
        row: usize,
    },
}
