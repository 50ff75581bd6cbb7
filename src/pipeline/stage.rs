//! Input staging: write one item's payload to a uniquely named temp file and
//! reserve the matching output path.
//!
//! ## Why guard objects?
//!
//! Every conversion attempt claims exactly two temp paths (staged input,
//! converter output). Both must disappear whatever happens afterwards —
//! success, non-zero exit, timeout, or an early error return. Tying deletion
//! to `Drop` makes that guarantee structural: the per-item step cannot exit
//! without releasing its files, and no call site needs to remember a cleanup
//! branch. The deletion *outcome* is still best-effort; a file that cannot be
//! removed is logged and never escalated over the conversion's own result.
//!
//! Staged inputs are written `0o600` on Unix. Temp directories are shared
//! between local users and staged documents can be sensitive.

use crate::config::InputSelector;
use crate::error::ItemError;
use crate::item::Item;
use crate::pipeline::format;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// A temp file owned by a single conversion attempt.
///
/// Dropping the handle removes the file if it exists. The output slot is
/// created as a `StagedFile` before the converter runs, so a conversion that
/// fails mid-way still cleans up whatever the converter managed to write.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    byte_length: u64,
    created_at: SystemTime,
}

impl StagedFile {
    /// Path of the staged file (for the output slot: where the converter is
    /// told to write; the file may not exist yet).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written at staging time (0 for the output slot).
    pub fn byte_length(&self) -> u64 {
        self.byte_length
    }

    /// When the path was claimed.
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            // The output slot legitimately has no file when the converter
            // failed before writing it.
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!("leaving temp file behind: {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Stage one item's payload and reserve the output path next to it.
///
/// Returns `(input, output_slot)`. Naming is `<prefix>-<millis>-<index>` with
/// the process id in the prefix, so names cannot collide within a run (index
/// differs) nor across concurrent processes sharing the temp dir (pid
/// differs). The input is created with `create_new`, so an actual collision
/// surfaces as an error instead of silently reusing a stranger's file.
pub async fn stage(
    item: &Item,
    index: usize,
    selector: &InputSelector,
    from_format: Option<&str>,
    to_extension: &str,
    dir: &Path,
) -> Result<(StagedFile, StagedFile), ItemError> {
    let (bytes, input_extension) = acquire_payload(item, index, selector, from_format)?;

    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let stem = format!("docmill-{}-{}-{}", std::process::id(), millis, index);

    let input_path = dir.join(format!("{stem}.{input_extension}"));
    let output_path = dir.join(format!("{stem}-out.{to_extension}"));

    let byte_length = bytes.len() as u64;
    write_owner_only(&input_path, bytes).await.map_err(|e| {
        ItemError::StageFailed {
            index,
            detail: format!("{}: {}", input_path.display(), e),
        }
    })?;
    debug!(
        "staged item {}: {} ({} bytes) -> {}",
        index,
        input_path.display(),
        byte_length,
        output_path.display()
    );

    let now = SystemTime::now();
    let input = StagedFile {
        path: input_path,
        byte_length,
        created_at: now,
    };
    let output = StagedFile {
        path: output_path,
        byte_length: 0,
        created_at: now,
    };
    Ok((input, output))
}

/// Pull the raw payload off the item and decide the staged extension.
///
/// Extension precedence: explicit from-format, else the upstream-declared
/// filename's extension (binary sources only), else `bin` / `txt`.
fn acquire_payload<'a>(
    item: &'a Item,
    index: usize,
    selector: &InputSelector,
    from_format: Option<&str>,
) -> Result<(&'a [u8], String), ItemError> {
    match selector {
        InputSelector::BinaryProperty(property) => {
            let attachment =
                item.attachment(property)
                    .ok_or_else(|| ItemError::AttachmentMissing {
                        index,
                        property: property.clone(),
                    })?;
            if attachment.data.is_empty() {
                return Err(ItemError::EmptySource { index });
            }
            let extension = match from_format {
                Some(f) => format::extension_for(f).to_string(),
                None => attachment
                    .file_extension()
                    .unwrap_or("bin")
                    .to_string(),
            };
            Ok((&attachment.data, extension))
        }
        InputSelector::TextField(field) => {
            let text = item
                .text_field(field)
                .ok_or_else(|| ItemError::FieldMissing {
                    index,
                    field: field.clone(),
                })?;
            if text.is_empty() {
                return Err(ItemError::EmptySource { index });
            }
            let extension = from_format
                .map(|f| format::extension_for(f).to_string())
                .unwrap_or_else(|| "txt".to_string());
            Ok((text.as_bytes(), extension))
        }
    }
}

async fn write_owner_only(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(())
}
