//! The batch item model: one JSON object plus named binary attachments.
//!
//! Every transform in this crate consumes and produces sequences of
//! [`Item`]s. The JSON half carries structured fields; the binary half
//! carries named [`Attachment`]s (document bytes, audio, converter output).
//! Attachment payloads serialise as base64 strings so whole batches can
//! round-trip through JSON files and stdin/stdout pipes.
//!
//! Two interchange forms are accepted when parsing:
//!
//! ```json
//! { "json": { "title": "x" }, "binary": { "data": { "data": "aGk=", "fileName": "a.md" } } }
//! { "title": "x" }
//! ```
//!
//! The second (a bare object) is shorthand for an item with only JSON fields.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// One unit of batch data.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Item {
    /// Structured fields.
    pub json: Map<String, Value>,
    /// Named binary attachments. Empty for most items.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub binary: BTreeMap<String, Attachment>,
}

/// A named binary payload carried by an [`Item`].
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Raw bytes; base64 on the wire.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    /// Filename declared by whoever produced the attachment.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub file_name: Option<String>,
    /// MIME type declared by whoever produced the attachment.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mime_type: Option<String>,
}

impl Item {
    /// An item with no fields and no attachments.
    pub fn new() -> Self {
        Self::default()
    }

    /// An item whose JSON is the given object.
    pub fn from_json_object(json: Map<String, Value>) -> Self {
        Self {
            json,
            binary: BTreeMap::new(),
        }
    }

    /// Parse a single item from an interchange value (full or bare form).
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        match value {
            Value::Object(mut map) => {
                // Full form only when "json" is itself an object; otherwise a
                // bare object that happens to contain a "json" field stays
                // a bare object.
                if map.get("json").map(Value::is_object).unwrap_or(false) {
                    let json = match map.remove("json") {
                        Some(Value::Object(m)) => m,
                        _ => unreachable!("checked above"),
                    };
                    let binary = match map.remove("binary") {
                        None | Some(Value::Null) => BTreeMap::new(),
                        Some(v) => serde_json::from_value(v)?,
                    };
                    Ok(Self { json, binary })
                } else {
                    Ok(Self::from_json_object(map))
                }
            }
            other => Err(serde_json::Error::custom(format!(
                "item must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Look up a JSON field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.json.get(name)
    }

    /// Look up a JSON field expected to hold a string.
    pub fn text_field(&self, name: &str) -> Option<&str> {
        self.json.get(name).and_then(Value::as_str)
    }

    /// Set (or overwrite) a JSON field.
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        self.json.insert(name.into(), value);
    }

    /// Look up a named attachment.
    pub fn attachment(&self, name: &str) -> Option<&Attachment> {
        self.binary.get(name)
    }

    /// Attach a binary payload under the given property name.
    pub fn set_attachment(&mut self, name: impl Into<String>, attachment: Attachment) {
        self.binary.insert(name.into(), attachment);
    }
}

impl<'de> Deserialize<'de> for Item {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Item::from_value(value).map_err(D::Error::custom)
    }
}

impl Attachment {
    /// An attachment holding the given bytes, with no declared metadata.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            file_name: None,
            mime_type: None,
        }
    }

    /// Declare the filename.
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Declare the MIME type.
    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    /// Extension of the declared filename, if any.
    pub fn file_extension(&self) -> Option<&str> {
        let name = self.file_name.as_deref()?;
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext)
    }

    /// Payload as a `data:` URI with the given MIME type.
    pub fn to_data_uri(&self, mime: &str) -> String {
        format!("data:{};base64,{}", mime, STANDARD.encode(&self.data))
    }
}

// Payloads can be megabytes; Debug prints the length, not the bytes.
impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("data", &format!("<{} bytes>", self.data.len()))
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// Parse a whole batch from an interchange value: either an array of items
/// or a single item (wrapped into a one-element batch).
pub fn items_from_value(value: Value) -> Result<Vec<Item>, serde_json::Error> {
    match value {
        Value::Array(values) => values.into_iter().map(Item::from_value).collect(),
        other => Ok(vec![Item::from_value(other)?]),
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
