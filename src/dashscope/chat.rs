//! Chat completion with named context sections.
//!
//! The user message sent over the wire is assembled from the configured
//! message plus zero or more context sections pulled from each item:
//!
//! ```text
//! 【Order history】:
//! { "orders": [ … ] }
//!
//! 【Knowledge base】:
//! plain string data is inserted verbatim
//!
//! 【用户消息】:
//! the configured message
//! ```
//!
//! Section data that is a JSON string goes in raw; anything else is
//! pretty-printed. Without sections the message is sent untouched. The
//! section markers are part of the wire contract (prompts downstream are
//! written against them), so they are not localised.

use crate::dashscope::{DashScopeClient, DEFAULT_BASE_URL};
use crate::error::{DocmillError, ItemError};
use crate::item::Item;
use crate::output::{BatchOutput, BatchStats, ItemOutcome};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Instant;
use tracing::{info, warn};

const CHAT_PATH: &str = "/compatible-mode/v1/chat/completions";

/// Where the per-item user message comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MessageSource {
    /// The same message for every item.
    Fixed(String),
    /// Read the message from this string field of each item.
    Field(String),
}

/// One named context section, rendered as `【name】:` in the user message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSpec {
    /// Section name shown in the marker.
    pub name: String,
    /// Item field supplying the data. `None` (or a missing field) sends the
    /// item's whole JSON object.
    pub field: Option<String>,
}

/// Configuration for a chat completion batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Model identifier: `qwen-plus`, `qwen-turbo`, `qwen-max`, `qwen-long`,
    /// or any other id the endpoint accepts. Default: `qwen-plus`.
    pub model: String,
    /// System role content. Default: `"You are a helpful assistant."`.
    pub system_prompt: String,
    /// User message per item.
    pub message: MessageSource,
    /// Context sections folded into the user message, in order.
    pub contexts: Vec<ContextSpec>,
    /// Sampling temperature (0–2). Sent only when set.
    pub temperature: Option<f64>,
    /// Completion token cap. Sent only when set.
    pub max_tokens: Option<u32>,
    /// Nucleus sampling parameter (0–1). Sent only when set.
    pub top_p: Option<f64>,
    /// Force a JSON object response (`response_format`). Default: off.
    pub json_format: bool,
    /// Echo the full API response under `fullResponse`. Default: off.
    pub include_raw: bool,
    /// Keep processing after an item fails. Default: `false`.
    pub continue_on_failure: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: "qwen-plus".to_string(),
            system_prompt: "You are a helpful assistant.".to_string(),
            message: MessageSource::Fixed(String::new()),
            contexts: Vec::new(),
            temperature: None,
            max_tokens: None,
            top_p: None,
            json_format: false,
            include_raw: false,
            continue_on_failure: false,
        }
    }
}

/// Run a chat completion for every item, strictly in input order.
///
/// Each successful item yields a `Text` outcome whose JSON carries
/// `response` (the assistant content, empty string when the reply has none),
/// `model` and `usage` as echoed by the API, and `fullResponse` when
/// requested.
pub async fn chat_items(
    client: &DashScopeClient,
    items: &[Item],
    config: &ChatConfig,
) -> Result<BatchOutput, DocmillError> {
    let total_start = Instant::now();
    let total_items = items.len();
    info!(
        "Chat completion: {} items, model {}",
        total_items, config.model
    );

    let mut outcomes: Vec<ItemOutcome> = Vec::with_capacity(total_items);
    let mut converted = 0usize;
    for (index, item) in items.iter().enumerate() {
        match chat_one(client, item, index, config).await {
            Ok(reply) => {
                converted += 1;
                outcomes.push(ItemOutcome::Text { index, item: reply });
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
        "Chat complete: {}/{} items, {}ms total",
        converted, total_items, stats.total_duration_ms
    );
    Ok(BatchOutput { outcomes, stats })
}

async fn chat_one(
    client: &DashScopeClient,
    item: &Item,
    index: usize,
    config: &ChatConfig,
) -> Result<Item, ItemError> {
    let message = resolve_message(item, index, &config.message)?;
    let sections = resolve_contexts(item, &config.contexts);
    let full_message = assemble_user_message(&message, &sections);
    let body = build_body(config, &full_message);

    let url = format!("{}{}", client.effective_base(DEFAULT_BASE_URL), CHAT_PATH);
    let response = client
        .post_json(&url, &body)
        .await
        .map_err(|e| ItemError::from_api(index, e))?;

    let content = response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let mut json = Map::new();
    json.insert("response".to_string(), Value::String(content));
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

fn resolve_message(
    item: &Item,
    index: usize,
    source: &MessageSource,
) -> Result<String, ItemError> {
    match source {
        MessageSource::Fixed(message) => Ok(message.clone()),
        MessageSource::Field(field) => item
            .text_field(field)
            .map(str::to_string)
            .ok_or_else(|| ItemError::FieldMissing {
                index,
                field: field.clone(),
            }),
    }
}

/// Materialise section data per item. A named field that is absent falls
/// back to the item's whole JSON object rather than failing.
fn resolve_contexts(item: &Item, specs: &[ContextSpec]) -> Vec<(String, Value)> {
    specs
        .iter()
        .map(|spec| {
            let data = spec
                .field
                .as_deref()
                .and_then(|field| item.field(field).cloned())
                .unwrap_or_else(|| Value::Object(item.json.clone()));
            (spec.name.clone(), data)
        })
        .collect()
}

pub(crate) fn assemble_user_message(message: &str, sections: &[(String, Value)]) -> String {
    if sections.is_empty() {
        return message.to_string();
    }
    let rendered: Vec<String> = sections
        .iter()
        .map(|(name, data)| {
            let body = match data {
                Value::String(s) => s.clone(),
                other => serde_json::to_string_pretty(other).unwrap_or_default(),
            };
            format!("【{name}】:\n{body}")
        })
        .collect();
    format!("{}\n\n【用户消息】:\n{}", rendered.join("\n\n"), message)
}

pub(crate) fn build_body(config: &ChatConfig, user_message: &str) -> Value {
    let mut body = json!({
        "model": config.model,
        "messages": [
            { "role": "system", "content": config.system_prompt },
            { "role": "user", "content": user_message },
        ],
    });
    if let Some(t) = config.temperature {
        body["temperature"] = json!(t);
    }
    if let Some(n) = config.max_tokens {
        body["max_tokens"] = json!(n);
    }
    if let Some(p) = config.top_p {
        body["top_p"] = json!(p);
    }
    if config.json_format {
        body["response_format"] = json!({ "type": "json_object" });
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_without_sections_is_untouched() {
        assert_eq!(assemble_user_message("hello", &[]), "hello");
    }

    #[test]
    fn sections_render_in_order_with_user_message_trailer() {
        let sections = vec![
            ("历史".to_string(), json!("raw string data")),
            ("Config".to_string(), json!({ "k": 1 })),
        ];
        let assembled = assemble_user_message("do the thing", &sections);
        assert_eq!(
            assembled,
            "【历史】:\nraw string data\n\n【Config】:\n{\n  \"k\": 1\n}\n\n【用户消息】:\ndo the thing"
        );
    }

    #[test]
    fn body_carries_options_only_when_set() {
        let mut config = ChatConfig::default();
        let body = build_body(&config, "hi");
        assert_eq!(body["model"], "qwen-plus");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert!(body.get("temperature").is_none());
        assert!(body.get("response_format").is_none());

        config.temperature = Some(0.7);
        config.max_tokens = Some(2048);
        config.json_format = true;
        let body = build_body(&config, "hi");
        assert_eq!(body["temperature"], 0.7);
        assert_eq!(body["max_tokens"], 2048);
        assert!(body.get("top_p").is_none());
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn context_field_falls_back_to_whole_item() {
        let mut item = Item::new();
        item.set_field("name", json!("ada"));
        let specs = vec![
            ContextSpec {
                name: "picked".to_string(),
                field: Some("name".to_string()),
            },
            ContextSpec {
                name: "whole".to_string(),
                field: Some("no_such_field".to_string()),
            },
        ];
        let sections = resolve_contexts(&item, &specs);
        assert_eq!(sections[0].1, json!("ada"));
        assert_eq!(sections[1].1, json!({ "name": "ada" }));
    }

    #[test]
    fn missing_message_field_is_an_item_error() {
        let item = Item::new();
        let err = resolve_message(&item, 3, &MessageSource::Field("prompt".into())).unwrap_err();
        assert!(matches!(err, ItemError::FieldMissing { index: 3, .. }));
    }
}
