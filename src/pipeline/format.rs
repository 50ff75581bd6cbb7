//! Format resolution: logical format ids → filesystem extensions, converter
//! CLI tokens, and the binary/text output classification.
//!
//! Pure lookups over a fixed table — no state, no I/O. Unknown ids are passed
//! through verbatim (the id becomes both the extension and the CLI token, and
//! the output is treated as text). That fallback is deliberate: Pandoc grows
//! readers and writers faster than this table, and passing an unknown name
//! straight through lets callers use them immediately. Pandoc itself rejects
//! ids it does not know.

/// Resolved filesystem/CLI form of one logical format id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatClass {
    /// Extension used for staged temp files (no leading dot).
    pub extension: String,
    /// Token passed to the converter on the command line.
    pub cli_token: String,
    /// Whether the converter writes this format as a binary file.
    pub binary_output: bool,
}

/// Formats the converter writes as binary files.
///
/// Classification is by this closed set only; file content is never sniffed.
const BINARY_OUTPUT_FORMATS: [&str; 6] = ["docx", "pptx", "xlsx", "pdf", "odt", "epub"];

/// Resolve a logical format id into its [`FormatClass`].
pub fn resolve(logical_id: &str) -> FormatClass {
    FormatClass {
        extension: extension_for(logical_id).to_string(),
        cli_token: output_cli_token(logical_id).to_string(),
        binary_output: is_binary_output(logical_id),
    }
}

/// Filesystem extension for a logical format id.
pub fn extension_for(format: &str) -> &str {
    match format {
        "markdown" | "markdown_strict" | "markdown_phpextra" | "markdown_mmd" | "gfm"
        | "commonmark" | "commonmark_x" => "md",
        "plain" | "text" => "txt",
        "html" | "html5" => "html",
        "latex" => "tex",
        "asciidoc" => "adoc",
        "docbook" => "xml",
        "rst" | "docx" | "pptx" | "xlsx" | "json" | "pdf" | "odt" | "epub" | "org"
        | "mediawiki" | "textile" | "jira" => format,
        unknown => unknown,
    }
}

/// CLI token for an explicit *input* format, or `None` when the converter
/// should sniff the format itself.
///
/// `"auto"` and the empty string are the auto-detect sentinels; `"text"` is a
/// display-level alias for the converter's `plain` reader.
pub fn input_cli_token(format: &str) -> Option<&str> {
    match format {
        "" | "auto" => None,
        "text" => Some("plain"),
        other => Some(other),
    }
}

/// CLI token for an *output* format (`"text"` aliases `plain`; everything
/// else passes through, known or not).
pub fn output_cli_token(format: &str) -> &str {
    match format {
        "text" => "plain",
        other => other,
    }
}

/// Whether a logical output format is written as binary.
pub fn is_binary_output(format: &str) -> bool {
    BINARY_OUTPUT_FORMATS.contains(&format)
}
