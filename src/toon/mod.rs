//! TOON (Token-Oriented Object Notation) codec and batch transforms.
//!
//! TOON is a compact, indentation-based rendering of JSON aimed at LLM
//! prompts: uniform arrays of flat objects collapse into one header plus one
//! row per element, which removes the quote/brace overhead JSON spends on
//! repeating every key:
//!
//! ```text
//! users[2]{id,name,role}:
//!   1,Alice,admin
//!   2,Bob,user
//! ```
//!
//! [`encode`] renders any JSON value, [`decode`] parses it back. The format
//! contract implemented here:
//!
//! * Objects nest by indentation as `key: value` lines; keys are quoted only
//!   when they leave `[A-Za-z_$][A-Za-z0-9_$-]*`.
//! * Arrays declare their length. Uniform arrays of flat objects become
//!   tabular blocks (`key[N]{f1,f2}:` plus one row per element), primitive
//!   arrays go inline (`key[N]: a,b,c`), everything else becomes a `- ` list
//!   whose elements carry their first line on the dash.
//! * Strings are quoted with JSON escapes only when ambiguous: empty,
//!   keyword or number lookalikes, leading/trailing whitespace, embedded
//!   delimiters, `: `, or structural lead-ins like `[` and `- `.
//! * Key folding (opt-in) collapses single-key object chains into dotted
//!   paths (`a.b.c: 1`); expand-paths on decode reverses it. Quoted keys
//!   never fold or expand.
//! * Strict decoding enforces declared lengths, row widths and indentation
//!   multiples; non-strict takes what is actually present.
//!
//! Two batch transforms wrap the codec. [`encode_items`] collapses the whole
//! batch's JSON into **one** array and emits a single item carrying the TOON
//! text (optionally with token-estimate metrics). [`decode_text`] parses one
//! TOON document into a single item.

pub mod decode;
pub mod encode;

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::error::{DocmillError, ItemError};
use crate::item::Item;
use crate::output::{BatchOutput, BatchStats, ItemOutcome};

pub use decode::decode;
pub use encode::encode;

/// Cell separator for inline arrays, tabular rows, and header field lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    Comma,
    Tab,
    Pipe,
}

impl Delimiter {
    pub fn as_char(self) -> char {
        match self {
            Delimiter::Comma => ',',
            Delimiter::Tab => '\t',
            Delimiter::Pipe => '|',
        }
    }
}

impl Default for Delimiter {
    fn default() -> Self {
        Delimiter::Comma
    }
}

/// Whether single-key object chains are folded into dotted paths on encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyFolding {
    Off,
    Safe,
}

impl Default for KeyFolding {
    fn default() -> Self {
        KeyFolding::Off
    }
}

/// Whether dotted keys are split back into nested objects on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpandPaths {
    Off,
    Safe,
}

impl Default for ExpandPaths {
    fn default() -> Self {
        ExpandPaths::Off
    }
}

/// Codec-level options for [`encode`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodeOptions {
    /// Spaces per nesting level.
    pub indent: usize,
    pub delimiter: Delimiter,
    pub key_folding: KeyFolding,
    /// Maximum segments per folded key; `None` is unlimited. Ignored unless
    /// `key_folding` is [`KeyFolding::Safe`].
    pub flatten_depth: Option<usize>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            indent: 2,
            delimiter: Delimiter::default(),
            key_folding: KeyFolding::default(),
            flatten_depth: None,
        }
    }
}

/// Codec-level options for [`decode`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeOptions {
    /// Enforce declared lengths, row widths, and indentation alignment.
    pub strict: bool,
    pub expand_paths: ExpandPaths,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            strict: true,
            expand_paths: ExpandPaths::default(),
        }
    }
}

/// Estimated token counts for one encode, JSON vs TOON.
///
/// Uses the rough "one token per four characters" heuristic; good enough to
/// decide whether the conversion is worth it, not a tokenizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetrics {
    pub json_tokens: usize,
    pub toon_tokens: usize,
    pub saved_tokens: i64,
    /// Relative saving as a rounded percentage, e.g. `"42%"`.
    pub reduction: String,
}

impl TokenMetrics {
    /// Compare a compact JSON rendering against its TOON rendering.
    pub fn comparing(json_text: &str, toon_text: &str) -> Self {
        let json_tokens = estimate_tokens(json_text);
        let toon_tokens = estimate_tokens(toon_text);
        let saved_tokens = json_tokens as i64 - toon_tokens as i64;
        let ratio = if json_tokens == 0 {
            0.0
        } else {
            saved_tokens as f64 / json_tokens as f64
        };
        Self {
            json_tokens,
            toon_tokens,
            saved_tokens,
            reduction: format!("{}%", (ratio * 100.0).round() as i64),
        }
    }

    fn to_value(&self) -> Value {
        json!({
            "jsonTokens": self.json_tokens,
            "toonTokens": self.toon_tokens,
            "savedTokens": self.saved_tokens,
            "reduction": self.reduction,
        })
    }
}

/// ≈ one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() + 3) / 4
}

/// Configuration for [`encode_items`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToonEncodeConfig {
    /// Field of the single output item that receives the TOON text.
    pub output_field: String,
    /// Keys to keep before encoding; empty keeps everything. Applied to
    /// objects at every array level, element-wise.
    pub selected_fields: Vec<String>,
    pub options: EncodeOptions,
    /// Attach a `tokenMetrics` object comparing compact JSON to the TOON
    /// text.
    pub token_metrics: bool,
}

impl Default for ToonEncodeConfig {
    fn default() -> Self {
        Self {
            output_field: "data".to_string(),
            selected_fields: Vec::new(),
            options: EncodeOptions::default(),
            token_metrics: false,
        }
    }
}

/// Configuration for [`decode_text`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToonDecodeConfig {
    /// Field of the single output item that receives the decoded value.
    pub output_field: String,
    pub options: DecodeOptions,
    /// Emit a `Failed` outcome on parse errors instead of aborting.
    pub continue_on_failure: bool,
}

impl Default for ToonDecodeConfig {
    fn default() -> Self {
        Self {
            output_field: "data".to_string(),
            options: DecodeOptions::default(),
            continue_on_failure: false,
        }
    }
}

/// Collapses every item's JSON into one array, encodes it, and returns a
/// single-item batch: `{<output_field>: toonText, tokenMetrics?}`.
///
/// Encoding is total over JSON, so this never fails. `stats` count the input
/// items that were collapsed, not the single item produced.
pub fn encode_items(items: &[Item], config: &ToonEncodeConfig) -> BatchOutput {
    let total_start = Instant::now();

    let collected: Vec<Value> = items
        .iter()
        .map(|item| Value::Object(item.json.clone()))
        .collect();
    let mut data = Value::Array(collected);

    let fields: Vec<&str> = config
        .selected_fields
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .collect();
    if !fields.is_empty() {
        data = filter_fields(&data, &fields);
    }

    let toon = encode(&data, &config.options);

    let mut json = Map::new();
    if config.token_metrics {
        let metrics = TokenMetrics::comparing(&data.to_string(), &toon);
        json.insert("tokenMetrics".to_string(), metrics.to_value());
    }
    json.insert(config.output_field.clone(), Value::String(toon));

    let stats = BatchStats {
        total_items: items.len(),
        converted: items.len(),
        failed: 0,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    BatchOutput {
        outcomes: vec![ItemOutcome::Text {
            index: 0,
            item: Item::from_json_object(json),
        }],
        stats,
    }
}

/// Parses one TOON document and returns a single-item batch:
/// `{<output_field>: value}`.
///
/// A parse error aborts the run unless `continue_on_failure` is set, in
/// which case the batch carries one `Failed` outcome.
pub fn decode_text(text: &str, config: &ToonDecodeConfig) -> Result<BatchOutput, DocmillError> {
    let total_start = Instant::now();

    let outcome = match decode(text, &config.options) {
        Ok(value) => {
            let mut json = Map::new();
            json.insert(config.output_field.clone(), value);
            ItemOutcome::Text {
                index: 0,
                item: Item::from_json_object(json),
            }
        }
        Err(err) => {
            let error = ItemError::from_toon(0, err);
            if !config.continue_on_failure {
                return Err(error.into());
            }
            warn!("TOON decode failed: {}", error);
            ItemOutcome::Failed { index: 0, error }
        }
    };

    let failed = usize::from(outcome.is_failure());
    let stats = BatchStats {
        total_items: 1,
        converted: 1 - failed,
        failed,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    Ok(BatchOutput {
        outcomes: vec![outcome],
        stats,
    })
}

/// Keeps only `fields` in objects, descending through arrays element-wise.
/// Kept values are copied whole; scalars pass through untouched.
fn filter_fields(data: &Value, fields: &[&str]) -> Value {
    match data {
        Value::Array(items) => Value::Array(items.iter().map(|v| filter_fields(v, fields)).collect()),
        Value::Object(map) => {
            let mut kept = Map::new();
            for field in fields {
                if let Some(value) = map.get(*field) {
                    kept.insert((*field).to_string(), value.clone());
                }
            }
            Value::Object(kept)
        }
        other => other.clone(),
    }
}

/// Keys matching this never need quotes, and dotted chains of them are safe
/// to fold/expand.
fn is_safe_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '-'))
}

/// Whether `s` is a complete JSON number literal. Shared by the encoder
/// (quote decision) and the decoder (scalar classification) so unquoted
/// tokens round-trip.
fn is_json_number(s: &str) -> bool {
    let b = s.as_bytes();
    let mut i = 0;
    if b.get(i) == Some(&b'-') {
        i += 1;
    }
    match b.get(i) {
        Some(b'0') => i += 1,
        Some(c) if c.is_ascii_digit() => {
            while i < b.len() && b[i].is_ascii_digit() {
                i += 1;
            }
        }
        _ => return false,
    }
    if b.get(i) == Some(&b'.') {
        i += 1;
        if !b.get(i).is_some_and(|c| c.is_ascii_digit()) {
            return false;
        }
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
        }
    }
    if matches!(b.get(i), Some(b'e') | Some(b'E')) {
        i += 1;
        if matches!(b.get(i), Some(b'+') | Some(b'-')) {
            i += 1;
        }
        if !b.get(i).is_some_and(|c| c.is_ascii_digit()) {
            return false;
        }
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
        }
    }
    i == b.len()
}
