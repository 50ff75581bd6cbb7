//! Speech transcription (Qwen3 ASR) over the multimodal generation endpoint.
//!
//! Audio travels inside the request as a `data:` URI, so there is no upload
//! step and no storage bucket involved; the trade-off is request size, which
//! grows ~4/3 over the raw audio. Works for the short clips ASR is meant for.
//!
//! ## Regional model ids
//!
//! The model id doubles as a region selector: `qwen3-asr-flash-intl` routes
//! to the Singapore endpoint and `qwen3-asr-flash-us` to the US endpoint,
//! while the suffix is stripped from the id actually sent over the wire
//! (the regional services know the model only under its plain name).

use crate::dashscope::{DashScopeClient, DEFAULT_BASE_URL};
use crate::error::{DocmillError, ItemError};
use crate::item::Item;
use crate::output::{BatchOutput, BatchStats, ItemOutcome};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Instant;
use tracing::{debug, info, warn};

const ASR_PATH: &str = "/api/v1/services/aigc/multimodal-generation/generation";
const INTL_BASE_URL: &str = "https://dashscope-intl.aliyuncs.com";
const US_BASE_URL: &str = "https://dashscope-us.aliyuncs.com";

/// Fallback MIME type when neither the attachment nor the URL declares one.
const DEFAULT_AUDIO_MIME: &str = "audio/mpeg";

/// Where each item's audio comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AudioSource {
    /// Read bytes from the named binary attachment. Default: `"data"`.
    BinaryProperty(String),
    /// Download from this URL (same URL for every item).
    Url(String),
}

impl Default for AudioSource {
    fn default() -> Self {
        AudioSource::BinaryProperty("data".to_string())
    }
}

/// Configuration for a transcription batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribeConfig {
    /// Audio per item.
    pub source: AudioSource,
    /// Model identifier, optionally with a region suffix (`-intl`, `-us`).
    /// Default: `qwen3-asr-flash`.
    pub model: String,
    /// ISO language hint (`zh`, `en`, `ja`, `ko`, `yue`). `None` or empty
    /// lets the service detect the language.
    pub language: Option<String>,
    /// Inverse text normalisation: spoken forms become written forms
    /// ("one hundred twenty three" → "123"). Default: off.
    pub enable_itn: bool,
    /// Optional recognition context sent as the system turn. Default: empty.
    pub system_prompt: String,
    /// Echo the full API response under `fullResponse`. Default: off.
    pub include_raw: bool,
    /// Keep processing after an item fails. Default: `false`.
    pub continue_on_failure: bool,
}

impl Default for TranscribeConfig {
    fn default() -> Self {
        Self {
            source: AudioSource::default(),
            model: "qwen3-asr-flash".to_string(),
            language: None,
            enable_itn: false,
            system_prompt: String::new(),
            include_raw: false,
            continue_on_failure: false,
        }
    }
}

/// Transcribe every item's audio, strictly in input order.
///
/// Each successful item yields a `Text` outcome whose JSON carries `text`
/// (the transcript, empty string when the reply has none), `model` and
/// `usage` as echoed by the API, and `fullResponse` when requested.
pub async fn transcribe_items(
    client: &DashScopeClient,
    items: &[Item],
    config: &TranscribeConfig,
) -> Result<BatchOutput, DocmillError> {
    if let AudioSource::Url(url) = &config.source {
        if url.trim().is_empty() {
            return Err(DocmillError::InvalidConfig(
                "Audio URL must not be empty".into(),
            ));
        }
    }

    let total_start = Instant::now();
    let total_items = items.len();
    let (base, wire_model) = region_endpoint(&config.model);
    info!(
        "Transcription: {} items, model {} via {}",
        total_items,
        wire_model,
        client.effective_base(base)
    );

    let mut outcomes: Vec<ItemOutcome> = Vec::with_capacity(total_items);
    let mut converted = 0usize;
    for (index, item) in items.iter().enumerate() {
        match transcribe_one(client, item, index, config, base, wire_model).await {
            Ok(transcript) => {
                converted += 1;
                outcomes.push(ItemOutcome::Text {
                    index,
                    item: transcript,
                });
            }
            Err(error) => {
                warn!("Item {} failed: {}", index, error);
                if config.continue_on_failure {
                    outcomes.push(ItemOutcome::Failed { index, error });
                } else {
                    return Err(error.into());
                }
            }
        }
    }

    let failed = outcomes.iter().filter(|o| o.is_failure()).count();
    let stats = BatchStats {
        total_items,
        converted,
        failed,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    info!(
        "Transcription complete: {}/{} items, {}ms total",
        converted, total_items, stats.total_duration_ms
    );
    Ok(BatchOutput { outcomes, stats })
}

async fn transcribe_one(
    client: &DashScopeClient,
    item: &Item,
    index: usize,
    config: &TranscribeConfig,
    base: &str,
    wire_model: &str,
) -> Result<Item, ItemError> {
    let audio_uri = acquire_audio(client, item, index, &config.source).await?;
    debug!("item {}: audio data URI of {} chars", index, audio_uri.len());

    let body = build_body(config, wire_model, &audio_uri);
    let url = format!("{}{}", client.effective_base(base), ASR_PATH);
    let response = client
        .post_json(&url, &body)
        .await
        .map_err(|e| ItemError::from_api(index, e))?;

    let text = extract_transcript(&response);
    let mut json = Map::new();
    json.insert("text".to_string(), Value::String(text));
    json.insert(
        "model".to_string(),
        response.get("model").cloned().unwrap_or(Value::Null),
    );
    json.insert(
        "usage".to_string(),
        response.get("usage").cloned().unwrap_or(Value::Null),
    );
    if config.include_raw {
        json.insert("fullResponse".to_string(), response);
    }
    Ok(Item::from_json_object(json))
}

/// Produce the `data:<mime>;base64,…` URI for one item's audio.
async fn acquire_audio(
    client: &DashScopeClient,
    item: &Item,
    index: usize,
    source: &AudioSource,
) -> Result<String, ItemError> {
    match source {
        AudioSource::BinaryProperty(property) => {
            let attachment =
                item.attachment(property)
                    .ok_or_else(|| ItemError::AttachmentMissing {
                        index,
                        property: property.clone(),
                    })?;
            if attachment.data.is_empty() {
                return Err(ItemError::EmptySource { index });
            }
            let mime = attachment.mime_type.as_deref().unwrap_or(DEFAULT_AUDIO_MIME);
            Ok(attachment.to_data_uri(mime))
        }
        AudioSource::Url(url) => {
            let bytes = client
                .get_bytes(url)
                .await
                .map_err(|e| ItemError::from_api(index, e))?;
            if bytes.is_empty() {
                return Err(ItemError::EmptySource { index });
            }
            let attachment = crate::item::Attachment::new(bytes);
            Ok(attachment.to_data_uri(mime_for_url(url)))
        }
    }
}

/// Audio MIME type inferred from the URL. Substring match, first hit wins.
fn mime_for_url(url: &str) -> &'static str {
    let lower = url.to_ascii_lowercase();
    if lower.contains(".wav") {
        "audio/wav"
    } else if lower.contains(".mp3") {
        "audio/mpeg"
    } else if lower.contains(".ogg") {
        "audio/ogg"
    } else if lower.contains(".flac") {
        "audio/flac"
    } else if lower.contains(".m4a") {
        "audio/mp4"
    } else {
        DEFAULT_AUDIO_MIME
    }
}

/// Map the model id to (base URL, wire model id), stripping region suffixes.
pub(crate) fn region_endpoint(model: &str) -> (&'static str, &str) {
    if let Some(plain) = model.strip_suffix("-intl") {
        (INTL_BASE_URL, plain)
    } else if let Some(plain) = model.strip_suffix("-us") {
        (US_BASE_URL, plain)
    } else {
        (DEFAULT_BASE_URL, model)
    }
}

pub(crate) fn build_body(config: &TranscribeConfig, wire_model: &str, audio_uri: &str) -> Value {
    let mut asr_options = Map::new();
    if let Some(language) = config.language.as_deref() {
        if !language.is_empty() {
            asr_options.insert("language".to_string(), json!(language));
        }
    }
    asr_options.insert("enable_itn".to_string(), json!(config.enable_itn));

    json!({
        "model": wire_model,
        "input": {
            "messages": [
                { "role": "system", "content": [{ "text": config.system_prompt }] },
                { "role": "user", "content": [{ "audio": audio_uri }] },
            ],
        },
        "parameters": {
            "result_format": "message",
            "asr_options": asr_options,
        },
    })
}

/// Pull the transcript out of `output.choices[0].message.content`, which is
/// either an array of `{text}` parts or a plain string.
fn extract_transcript(response: &Value) -> String {
    match response.pointer("/output/choices/0/message/content") {
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect(),
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Attachment;

    #[test]
    fn region_suffix_selects_base_and_strips_model() {
        assert_eq!(
            region_endpoint("qwen3-asr-flash"),
            (DEFAULT_BASE_URL, "qwen3-asr-flash")
        );
        assert_eq!(
            region_endpoint("qwen3-asr-flash-intl"),
            (INTL_BASE_URL, "qwen3-asr-flash")
        );
        assert_eq!(
            region_endpoint("qwen3-asr-flash-us"),
            (US_BASE_URL, "qwen3-asr-flash")
        );
    }

    #[test]
    fn url_mime_table() {
        assert_eq!(mime_for_url("https://x.test/a.WAV"), "audio/wav");
        assert_eq!(mime_for_url("https://x.test/a.mp3?sig=1"), "audio/mpeg");
        assert_eq!(mime_for_url("https://x.test/a.ogg"), "audio/ogg");
        assert_eq!(mime_for_url("https://x.test/a.flac"), "audio/flac");
        assert_eq!(mime_for_url("https://x.test/a.m4a"), "audio/mp4");
        assert_eq!(mime_for_url("https://x.test/clip"), "audio/mpeg");
    }

    #[test]
    fn body_shape_with_and_without_language() {
        let mut config = TranscribeConfig::default();
        let body = build_body(&config, "qwen3-asr-flash", "data:audio/wav;base64,aGk=");
        assert_eq!(body["model"], "qwen3-asr-flash");
        assert_eq!(body["parameters"]["result_format"], "message");
        assert_eq!(body["parameters"]["asr_options"]["enable_itn"], false);
        assert!(body["parameters"]["asr_options"].get("language").is_none());
        assert_eq!(
            body["input"]["messages"][1]["content"][0]["audio"],
            "data:audio/wav;base64,aGk="
        );

        config.language = Some("zh".to_string());
        config.enable_itn = true;
        let body = build_body(&config, "qwen3-asr-flash", "data:audio/wav;base64,aGk=");
        assert_eq!(body["parameters"]["asr_options"]["language"], "zh");
        assert_eq!(body["parameters"]["asr_options"]["enable_itn"], true);
    }

    #[test]
    fn transcript_concatenates_array_parts() {
        let response = serde_json::json!({
            "output": { "choices": [{ "message": { "content": [
                { "text": "你好" },
                { "other": true },
                { "text": "，世界" },
            ]}}]}
        });
        assert_eq!(extract_transcript(&response), "你好，世界");

        let string_form = serde_json::json!({
            "output": { "choices": [{ "message": { "content": "plain" }}]}
        });
        assert_eq!(extract_transcript(&string_form), "plain");
        assert_eq!(extract_transcript(&serde_json::json!({})), "");
    }

    #[tokio::test]
    async fn missing_and_empty_attachments_fail_before_any_io() {
        let client = DashScopeClient::new("sk-test");
        let source = AudioSource::BinaryProperty("data".to_string());

        let bare = Item::new();
        let err = acquire_audio(&client, &bare, 0, &source).await.unwrap_err();
        assert!(matches!(err, ItemError::AttachmentMissing { .. }));

        let mut empty = Item::new();
        empty.set_attachment("data", Attachment::new(Vec::new()));
        let err = acquire_audio(&client, &empty, 1, &source).await.unwrap_err();
        assert!(matches!(err, ItemError::EmptySource { index: 1 }));
    }

    #[tokio::test]
    async fn attachment_mime_feeds_the_data_uri() {
        let client = DashScopeClient::new("sk-test");
        let mut item = Item::new();
        item.set_attachment(
            "data",
            Attachment::new(b"hi".to_vec()).with_mime_type("audio/wav"),
        );
        let uri = acquire_audio(
            &client,
            &item,
            0,
            &AudioSource::BinaryProperty("data".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(uri, "data:audio/wav;base64,aGk=");
    }
}
