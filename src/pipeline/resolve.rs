//! Output resolution: read what the converter wrote and shape it into an
//! outcome item.
//!
//! The binary/text branch is decided by the *target format's* classification
//! alone — never by sniffing the produced file. A converter that writes HTML
//! into a file we were told is `docx` still comes back as a binary
//! attachment; garbage in, faithfully-labelled garbage out.

use crate::error::ItemError;
use crate::item::{Attachment, Item};
use crate::output::ItemOutcome;
use crate::pipeline::format::FormatClass;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

/// Per-item output settings, one borrow instead of four loose parameters.
pub struct OutputShape<'a> {
    /// JSON field receiving text results.
    pub field: &'a str,
    /// Attachment property receiving binary results.
    pub property: &'a str,
    /// Whether the original item's JSON is carried into the result.
    pub passthrough: bool,
}

/// Read the converter's output file and build the outcome for this item.
///
/// Fails with [`ItemError::MissingOutput`] when the file cannot be read —
/// the converter exited cleanly but produced nothing usable.
pub async fn resolve_output(
    output_path: &Path,
    class: &FormatClass,
    original: &Item,
    index: usize,
    shape: &OutputShape<'_>,
) -> Result<ItemOutcome, ItemError> {
    let bytes = tokio::fs::read(output_path)
        .await
        .map_err(|e| ItemError::MissingOutput {
            index,
            detail: format!("{}: {}", output_path.display(), e),
        })?;
    debug!(
        "item {}: read {} bytes of {} output",
        index,
        bytes.len(),
        if class.binary_output { "binary" } else { "text" }
    );

    if class.binary_output {
        let attachment = Attachment::new(bytes)
            .with_file_name(format!("output.{}", class.extension))
            .with_mime_type(
                mime_guess::from_ext(&class.extension)
                    .first_or_octet_stream()
                    .essence_str(),
            );
        let json = if shape.passthrough {
            original.json.clone()
        } else {
            Map::new()
        };
        let mut item = Item::from_json_object(json);
        item.set_attachment(shape.property, attachment);
        Ok(ItemOutcome::Binary { index, item })
    } else {
        // Decoded the way a text pipe would: invalid sequences become U+FFFD
        // instead of failing an otherwise successful conversion.
        let content = String::from_utf8_lossy(&bytes).into_owned();
        let mut json = if shape.passthrough {
            original.json.clone()
        } else {
            Map::new()
        };
        // Insert after the copy so the conversion output always wins over a
        // passthrough field of the same name.
        json.insert(shape.field.to_string(), Value::String(content));
        Ok(ItemOutcome::Text {
            index,
            item: Item::from_json_object(json),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::format;
    use serde_json::json;

    const SHAPE: OutputShape<'static> = OutputShape {
        field: "text",
        property: "data",
        passthrough: true,
    };

    fn original() -> Item {
        let mut item = Item::new();
        item.set_field("source", json!("upstream"));
        item.set_field("text", json!("the old value"));
        item
    }

    #[tokio::test]
    async fn text_output_lands_under_field_and_wins_over_passthrough() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.html");
        std::fs::write(&path, "<p>converted</p>").unwrap();

        let outcome = resolve_output(&path, &format::resolve("html"), &original(), 0, &SHAPE)
            .await
            .unwrap();
        let item = match outcome {
            ItemOutcome::Text { index: 0, item } => item,
            other => panic!("expected Text, got {other:?}"),
        };
        assert_eq!(item.text_field("text"), Some("<p>converted</p>"));
        assert_eq!(item.text_field("source"), Some("upstream"));
    }

    #[tokio::test]
    async fn binary_output_becomes_named_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.docx");
        std::fs::write(&path, [0x50, 0x4B, 0x03, 0x04]).unwrap();

        let outcome = resolve_output(&path, &format::resolve("docx"), &original(), 2, &SHAPE)
            .await
            .unwrap();
        let item = match outcome {
            ItemOutcome::Binary { index: 2, item } => item,
            other => panic!("expected Binary, got {other:?}"),
        };
        let attachment = item.attachment("data").unwrap();
        assert_eq!(attachment.data, vec![0x50, 0x4B, 0x03, 0x04]);
        assert_eq!(attachment.file_name.as_deref(), Some("output.docx"));
        assert!(attachment.mime_type.as_deref().unwrap().starts_with("application/"));
        // Passthrough copies the JSON next to the attachment.
        assert_eq!(item.text_field("source"), Some("upstream"));
    }

    #[tokio::test]
    async fn passthrough_off_leaves_json_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.md");
        std::fs::write(&path, "# hi").unwrap();

        let shape = OutputShape {
            passthrough: false,
            ..SHAPE
        };
        let outcome = resolve_output(&path, &format::resolve("markdown"), &original(), 0, &shape)
            .await
            .unwrap();
        let item = outcome.item().unwrap();
        assert_eq!(item.json.len(), 1);
        assert_eq!(item.text_field("text"), Some("# hi"));
    }

    #[tokio::test]
    async fn unreadable_output_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never-written.pdf");
        let err = resolve_output(&path, &format::resolve("pdf"), &original(), 4, &SHAPE)
            .await
            .unwrap_err();
        assert!(matches!(err, ItemError::MissingOutput { index: 4, .. }));
    }

    #[tokio::test]
    async fn invalid_utf8_text_output_is_decoded_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        std::fs::write(&path, [b'o', b'k', 0xFF, b'!']).unwrap();

        let outcome = resolve_output(&path, &format::resolve("plain"), &original(), 0, &SHAPE)
            .await
            .unwrap();
        let text = outcome.item().unwrap().text_field("text").unwrap().to_string();
        assert!(text.starts_with("ok"));
        assert!(text.contains('\u{FFFD}'));
    }
}
