//! Configuration types for batch document conversion.
//!
//! All conversion behaviour is controlled through [`ConvertConfig`], built
//! via its [`ConvertConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share configs across threads, log them, and diff two runs
//! to understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A twelve-field constructor is unreadable and breaks on every new field.
//! The builder pattern lets callers set only what they care about and rely on
//! well-documented defaults for the rest.

use crate::error::DocmillError;
use crate::progress::BatchProgress;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Where an item's source document comes from.
///
/// Most pipelines carry documents as binary attachments; text-bearing
/// pipelines (scraped HTML, generated Markdown) carry them in a JSON field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputSelector {
    /// Read bytes from the named binary attachment. Default: `"data"`.
    BinaryProperty(String),
    /// Read UTF-8 text from the named JSON field.
    TextField(String),
}

impl Default for InputSelector {
    fn default() -> Self {
        InputSelector::BinaryProperty("data".to_string())
    }
}

impl InputSelector {
    /// The attachment property or field name this selector points at.
    pub fn name(&self) -> &str {
        match self {
            InputSelector::BinaryProperty(name) | InputSelector::TextField(name) => name,
        }
    }
}

/// Configuration for a batch conversion run.
///
/// Built via [`ConvertConfig::builder()`] or using
/// [`ConvertConfig::default()`].
///
/// # Example
/// ```rust
/// use docmill::ConvertConfig;
///
/// let config = ConvertConfig::builder()
///     .from_format("html")
///     .to_format("markdown")
///     .continue_on_failure(true)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConvertConfig {
    /// Converter executable to run. Default: the `PANDOC_PATH` environment
    /// variable if set, otherwise `pandoc` resolved through `PATH`.
    ///
    /// The executable is never passed through a shell; it is spawned directly
    /// with a constructed argv, so the value may contain spaces but not
    /// shell syntax.
    pub executable: PathBuf,

    /// Where each item's source document is read from.
    /// Default: the `data` binary attachment.
    pub input: InputSelector,

    /// Source format identifier, e.g. `"html"`, `"docx"`, `"markdown"`.
    /// Default: `None`.
    ///
    /// `None` leaves format detection to the converter, which infers it from
    /// the staged file's extension. Setting it pins the reading behaviour
    /// via `-f` and also names the staged file accordingly, so the two
    /// detection paths can never disagree.
    pub from_format: Option<String>,

    /// Target format identifier. Default: `"markdown"`.
    ///
    /// Decides both the `-t` token and whether the result comes back as a
    /// text field or a binary attachment (`docx`, `pptx`, `xlsx`, `pdf`,
    /// `odt` and `epub` are binary; everything else is text).
    pub to_format: String,

    /// Extra command-line arguments, whitespace-separated. Default: `""`.
    ///
    /// Split on whitespace only. There is no quoting layer, so an argument
    /// that needs an embedded space cannot be expressed; in exchange,
    /// nothing here is ever interpreted by a shell.
    pub extra_args: String,

    /// JSON field receiving text results. Default: `"text"`.
    pub output_field: String,

    /// Attachment property receiving binary results. Default: `"data"`.
    pub output_property: String,

    /// Carry each input item's JSON into its result. Default: `true`.
    pub passthrough: bool,

    /// Keep processing after an item fails. Default: `false`.
    ///
    /// When enabled, a failed item yields a `Failed` outcome at its position
    /// and the run continues. When disabled, the first failure aborts the
    /// whole run with that item's error; temp files are cleaned up either way.
    pub continue_on_failure: bool,

    /// Hard ceiling on one converter invocation. Default: 120 s.
    ///
    /// Generous on purpose: a large DOCX to PDF conversion routinely takes
    /// tens of seconds. On expiry the child process is killed, not orphaned.
    pub timeout: Duration,

    /// Directory for staging temp files. Default: the system temp directory.
    pub temp_dir: Option<PathBuf>,

    /// Optional progress observer, called at run and item boundaries.
    pub progress: Option<Arc<dyn BatchProgress>>,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            input: InputSelector::default(),
            from_format: None,
            to_format: "markdown".to_string(),
            extra_args: String::new(),
            output_field: "text".to_string(),
            output_property: "data".to_string(),
            passthrough: true,
            continue_on_failure: false,
            timeout: Duration::from_millis(120_000),
            temp_dir: None,
            progress: None,
        }
    }
}

fn default_executable() -> PathBuf {
    std::env::var_os("PANDOC_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("pandoc"))
}

impl fmt::Debug for ConvertConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvertConfig")
            .field("executable", &self.executable)
            .field("input", &self.input)
            .field("from_format", &self.from_format)
            .field("to_format", &self.to_format)
            .field("extra_args", &self.extra_args)
            .field("output_field", &self.output_field)
            .field("output_property", &self.output_property)
            .field("passthrough", &self.passthrough)
            .field("continue_on_failure", &self.continue_on_failure)
            .field("timeout", &self.timeout)
            .field("temp_dir", &self.temp_dir)
            .field("progress", &self.progress.as_ref().map(|_| "<dyn BatchProgress>"))
            .finish()
    }
}

impl ConvertConfig {
    /// Create a new builder for `ConvertConfig`.
    pub fn builder() -> ConvertConfigBuilder {
        ConvertConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConvertConfig`].
#[derive(Debug)]
pub struct ConvertConfigBuilder {
    config: ConvertConfig,
}

impl ConvertConfigBuilder {
    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.executable = path.into();
        self
    }

    pub fn input(mut self, selector: InputSelector) -> Self {
        self.config.input = selector;
        self
    }

    /// Read each item's document from the named binary attachment.
    pub fn binary_property(mut self, name: impl Into<String>) -> Self {
        self.config.input = InputSelector::BinaryProperty(name.into());
        self
    }

    /// Read each item's document from the named JSON text field.
    pub fn text_field(mut self, name: impl Into<String>) -> Self {
        self.config.input = InputSelector::TextField(name.into());
        self
    }

    /// Source format. Empty or `"auto"` (any case) means auto-detect.
    pub fn from_format(mut self, format: impl Into<String>) -> Self {
        let format = format.into();
        let trimmed = format.trim();
        self.config.from_format =
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
                None
            } else {
                Some(trimmed.to_string())
            };
        self
    }

    pub fn to_format(mut self, format: impl Into<String>) -> Self {
        self.config.to_format = format.into().trim().to_string();
        self
    }

    pub fn extra_args(mut self, args: impl Into<String>) -> Self {
        self.config.extra_args = args.into();
        self
    }

    pub fn output_field(mut self, name: impl Into<String>) -> Self {
        self.config.output_field = name.into();
        self
    }

    pub fn output_property(mut self, name: impl Into<String>) -> Self {
        self.config.output_property = name.into();
        self
    }

    pub fn passthrough(mut self, v: bool) -> Self {
        self.config.passthrough = v;
        self
    }

    pub fn continue_on_failure(mut self, v: bool) -> Self {
        self.config.continue_on_failure = v;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeout = Duration::from_millis(ms.max(1));
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    pub fn progress(mut self, observer: Arc<dyn BatchProgress>) -> Self {
        self.config.progress = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConvertConfig, DocmillError> {
        let c = &self.config;
        if c.executable.as_os_str().is_empty() {
            return Err(DocmillError::InvalidConfig(
                "Converter executable must not be empty".into(),
            ));
        }
        if c.to_format.is_empty() {
            return Err(DocmillError::InvalidConfig(
                "Target format must not be empty".into(),
            ));
        }
        if c.input.name().trim().is_empty() {
            return Err(DocmillError::InvalidConfig(
                "Input property/field name must not be empty".into(),
            ));
        }
        if c.output_field.trim().is_empty() || c.output_property.trim().is_empty() {
            return Err(DocmillError::InvalidConfig(
                "Output field and property names must not be empty".into(),
            ));
        }
        if c.timeout.is_zero() {
            return Err(DocmillError::InvalidConfig("Timeout must be ≥ 1ms".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_and_blank_source_formats_mean_autodetect() {
        for spelling in ["", "  ", "auto", "AUTO", " Auto "] {
            let config = ConvertConfig::builder()
                .from_format(spelling)
                .build()
                .unwrap();
            assert_eq!(config.from_format, None, "spelling {spelling:?}");
        }
        let config = ConvertConfig::builder().from_format(" html ").build().unwrap();
        assert_eq!(config.from_format.as_deref(), Some("html"));
    }

    #[test]
    fn empty_target_format_rejected() {
        let err = ConvertConfig::builder().to_format("  ").build().unwrap_err();
        assert!(err.to_string().contains("Target format"), "got: {err}");
    }

    #[test]
    fn zero_timeout_rejected_but_floor_applied_by_ms_setter() {
        assert!(ConvertConfig::builder()
            .timeout(Duration::ZERO)
            .build()
            .is_err());
        let config = ConvertConfig::builder().timeout_ms(0).build().unwrap();
        assert_eq!(config.timeout, Duration::from_millis(1));
    }
}
