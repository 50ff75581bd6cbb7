//! CLI binary for docmill.
//!
//! A thin shim over the library crate that maps CLI flags
//! to the transform configs and prints item outcomes as JSON.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docmill::toon::{DecodeOptions, Delimiter, EncodeOptions, ExpandPaths, KeyFolding};
use docmill::{
    chat_items, convert_items, decode_text, encode_items, items_from_value, stamp_items,
    transcribe_items, Attachment, AudioSource, BatchOutput, BatchProgress, BatchStats, ChatConfig,
    ContextSpec, ConvertConfig, DashScopeClient, Item, ItemOutcome, MarkdownConfig, MessageSource,
    ToonDecodeConfig, ToonEncodeConfig, TranscribeConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress observer using indicatif ────────────────────────────────────

/// Terminal progress observer: renders a live progress bar and per-item log
/// lines using [indicatif]. Items finish strictly in input order, but start
/// times are still tracked per index so elapsed reporting stays honest.
struct CliProgress {
    /// The single progress bar anchored at the bottom of the terminal.
    bar: ProgressBar,
    /// Per-item wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<usize, Instant>>,
    /// Count of items that errored out.
    errors: AtomicUsize,
}

impl CliProgress {
    /// Create an observer whose progress-bar length is set dynamically
    /// by `on_run_start` (called before any items are staged).
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_run_start

        // Initial style: spinner only (no counter until we know the total).
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading items…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    /// Switch to the full progress-bar style once we know `total`.
    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} items  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }
}

impl BatchProgress for CliProgress {
    fn on_run_start(&self, total_items: usize) {
        // Switch from spinner-only style to full progress bar now that we
        // know the actual item count.
        self.activate_bar(total_items);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total_items} items…"))
        ));
    }

    fn on_item_start(&self, index: usize, _total_items: usize) {
        self.start_times
            .lock()
            .unwrap()
            .insert(index, Instant::now());
        self.bar.set_message(format!("item {}", index + 1));
    }

    fn on_item_complete(&self, index: usize, total_items: usize, output_len: usize) {
        let elapsed_ms = self
            .start_times
            .lock()
            .unwrap()
            .remove(&index)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);

        self.bar.println(format!(
            "  {} Item {:>3}/{:<3}  {:<11}  {}",
            green("✓"),
            index + 1,
            total_items,
            dim(&format!("{output_len:>6} bytes")),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, index: usize, total_items: usize, error: &str) {
        let elapsed_ms = self
            .start_times
            .lock()
            .unwrap()
            .remove(&index)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);

        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg = if error.len() > 80 {
            let mut end = 79;
            while !error.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}\u{2026}", &error[..end])
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Item {:>3}/{:<3}  {}  {}",
            red("✗"),
            index + 1,
            total_items,
            red(&msg),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_items: usize, success_count: usize) {
        let failed = total_items.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} items converted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} items converted  ({} failed)",
                if failed == total_items {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_items,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert one document, bare result on stdout
  docmill convert report.docx --to markdown

  # Convert to a file
  docmill convert report.docx --to html --out report.html

  # Batch over an items file, tolerating bad items
  docmill convert --items items.json --from html --to markdown --continue-on-failure

  # Markdown carried in a JSON field, standalone HTML out
  docmill convert --items items.json --text-field text --from markdown --to html \
      --extra-args "--standalone --toc"

  # Chat completion per item, prompt read from each item's `question` field
  docmill chat --items items.json --prompt-field question --model qwen-plus

  # Fixed prompt plus labelled context sections
  docmill chat --items items.json --prompt "Summarise this order" \
      --context "Order history=orders" --context "Customer=customer"

  # Transcribe audio attachments (Chinese, written number forms)
  docmill transcribe --items items.json --language zh --enable-itn

  # Stamp a markdown file onto a fresh item
  docmill markdown @notes.md

  # Encode a batch as TOON and show the token savings
  docmill toon encode --items items.json --token-metrics

  # Decode TOON from stdin, expanding dotted keys
  docmill toon decode --expand-paths safe < data.toon

ITEMS FILE:
  A JSON array (or a single object) of items; '-' reads stdin. Both item
  forms are accepted:
    { "title": "bare fields" }
    { "json": { "title": "full form" },
      "binary": { "data": { "data": "<base64>", "fileName": "a.docx" } } }

ENVIRONMENT VARIABLES:
  DASHSCOPE_API_KEY    DashScope API key (chat, transcribe)
  DASHSCOPE_BASE_URL   Route every API call to this base URL
  PANDOC_PATH          Converter executable (default: pandoc on PATH)
  DOCMILL_TO           Default target format for convert
  DOCMILL_TIMEOUT      Converter timeout per item, seconds
  DOCMILL_TEMP_DIR     Staging directory for converter temp files
  DOCMILL_CHAT_MODEL   Default chat model
  DOCMILL_ASR_MODEL    Default transcription model

SETUP:
  1. Install pandoc:     https://pandoc.org/installing.html
  2. Convert something:  docmill convert thesis.docx --to markdown --out thesis.md

  For chat and transcribe, set DASHSCOPE_API_KEY first.
"#;

/// Batch document conversion and enrichment for JSON item pipelines.
#[derive(Parser, Debug)]
#[command(
    name = "docmill",
    version,
    about = "Batch document conversion and enrichment for JSON item pipelines",
    long_about = "Convert item documents between formats with a local pandoc, run them through \
DashScope (Qwen) chat or speech transcription, stamp fixed markdown, or encode whole batches as \
token-lean TOON text. Items are JSON objects with optional base64 attachments; every command \
reads an item batch and writes one outcome per item.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Write the result to this file instead of stdout.
    #[arg(short, long, global = true)]
    out: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCMILL_VERBOSE", global = true)]
    verbose: bool,

    /// Suppress all output except errors and the result itself.
    #[arg(short, long, env = "DOCMILL_QUIET", global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert item documents between formats with a local pandoc.
    Convert(ConvertArgs),
    /// Run each item through a DashScope chat model.
    Chat(ChatArgs),
    /// Transcribe item audio with a DashScope ASR model.
    Transcribe(TranscribeArgs),
    /// Stamp a fixed markdown document onto every item.
    Markdown(MarkdownArgs),
    /// Encode item batches as TOON text, or decode TOON back to JSON.
    #[command(subcommand)]
    Toon(ToonCommand),
}

#[derive(clap::Args, Debug)]
struct ConvertArgs {
    /// Single input file; shorthand for a one-item batch carrying this file.
    #[arg(conflicts_with = "items")]
    file: Option<PathBuf>,

    /// Items JSON file ('-' for stdin). Default: stdin.
    #[arg(long)]
    items: Option<PathBuf>,

    /// Source format (pandoc reader name). Default: sniffed from the file extension.
    #[arg(short = 'f', long)]
    from: Option<String>,

    /// Target format (pandoc writer name).
    #[arg(short = 't', long, env = "DOCMILL_TO", default_value = "markdown")]
    to: String,

    /// Read input bytes from this attachment property.
    #[arg(long, default_value = "data", conflicts_with = "text_field")]
    binary_property: String,

    /// Read input text from this JSON field instead of an attachment.
    #[arg(long)]
    text_field: Option<String>,

    /// Extra converter arguments, whitespace-separated.
    #[arg(long)]
    extra_args: Option<String>,

    /// JSON field receiving text results.
    #[arg(long, default_value = "text")]
    output_field: String,

    /// Attachment property receiving binary results.
    #[arg(long, default_value = "data")]
    output_property: String,

    /// Drop input JSON fields from the output items.
    #[arg(long)]
    no_passthrough: bool,

    /// Record failures as outcomes instead of aborting the batch.
    #[arg(long)]
    continue_on_failure: bool,

    /// Converter timeout per item, seconds.
    #[arg(long, env = "DOCMILL_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Converter executable.
    #[arg(long, env = "PANDOC_PATH")]
    pandoc: Option<PathBuf>,

    /// Staging directory for temp files. Default: the system temp directory.
    #[arg(long, env = "DOCMILL_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Print the item JSON even for a single-file conversion.
    #[arg(long)]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "DOCMILL_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(clap::Args, Debug)]
struct ChatArgs {
    /// Items JSON file ('-' for stdin). Default: stdin.
    #[arg(long)]
    items: Option<PathBuf>,

    /// Item field holding each item's user message.
    #[arg(long, default_value = "prompt", conflicts_with = "prompt")]
    prompt_field: String,

    /// Fixed user message for every item ('@path' reads a file).
    #[arg(short, long)]
    prompt: Option<String>,

    /// Model ID (qwen-plus, qwen-turbo, qwen-max, qwen-long, …).
    #[arg(short, long, env = "DOCMILL_CHAT_MODEL", default_value = "qwen-plus")]
    model: String,

    /// System prompt ('@path' reads a file).
    #[arg(short, long)]
    system: Option<String>,

    /// Context section folded into the user message: NAME=FIELD, or NAME
    /// alone for the whole item. Repeatable; sections render in order.
    #[arg(long = "context", value_name = "NAME[=FIELD]")]
    contexts: Vec<String>,

    /// Sampling temperature (0.0–2.0).
    #[arg(long)]
    temperature: Option<f64>,

    /// Max completion tokens.
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Nucleus sampling parameter (0.0–1.0).
    #[arg(long)]
    top_p: Option<f64>,

    /// Force a JSON-object response.
    #[arg(long)]
    json_response: bool,

    /// Echo the raw API response under `fullResponse`.
    #[arg(long)]
    full_response: bool,

    /// Record failures as outcomes instead of aborting the batch.
    #[arg(long)]
    continue_on_failure: bool,

    /// DashScope API key.
    #[arg(long, env = "DASHSCOPE_API_KEY", hide_env_values = true)]
    api_key: String,

    /// API base URL override (regional endpoints, proxies, mocks).
    #[arg(long, env = "DASHSCOPE_BASE_URL")]
    base_url: Option<String>,
}

#[derive(clap::Args, Debug)]
struct TranscribeArgs {
    /// Items JSON file ('-' for stdin). Default: stdin.
    #[arg(long)]
    items: Option<PathBuf>,

    /// Read audio bytes from this attachment property.
    #[arg(long, default_value = "data", conflicts_with = "url")]
    binary_property: String,

    /// Download audio from this URL instead (same URL for every item).
    #[arg(long)]
    url: Option<String>,

    /// Model ID; '-intl' and '-us' suffixes pick the regional endpoint.
    #[arg(short, long, env = "DOCMILL_ASR_MODEL", default_value = "qwen3-asr-flash")]
    model: String,

    /// Language hint (zh, en, ja, ko, yue). Default: auto-detect.
    #[arg(short, long)]
    language: Option<String>,

    /// Inverse text normalisation: spoken forms become written forms.
    #[arg(long)]
    enable_itn: bool,

    /// Recognition context biasing the transcript ('@path' reads a file).
    #[arg(long)]
    context: Option<String>,

    /// Echo the raw API response under `fullResponse`.
    #[arg(long)]
    full_response: bool,

    /// Record failures as outcomes instead of aborting the batch.
    #[arg(long)]
    continue_on_failure: bool,

    /// DashScope API key.
    #[arg(long, env = "DASHSCOPE_API_KEY", hide_env_values = true)]
    api_key: String,

    /// API base URL override (regional endpoints, proxies, mocks).
    #[arg(long, env = "DASHSCOPE_BASE_URL")]
    base_url: Option<String>,
}

#[derive(clap::Args, Debug)]
struct MarkdownArgs {
    /// Markdown text to stamp ('@path' reads a file, '-' reads stdin).
    content: String,

    /// Items JSON file ('-' for stdin). Default: a single empty item.
    #[arg(long)]
    items: Option<PathBuf>,

    /// Output field receiving the markdown.
    #[arg(long, default_value = "markdown")]
    output_field: String,

    /// Keep surrounding whitespace (trimmed by default).
    #[arg(long)]
    no_trim: bool,

    /// Merge each input item's fields into its output.
    #[arg(long)]
    keep_input: bool,
}

#[derive(Subcommand, Debug)]
enum ToonCommand {
    /// Collapse an item batch into one TOON document.
    Encode(ToonEncodeArgs),
    /// Parse TOON text back into JSON.
    Decode(ToonDecodeArgs),
}

#[derive(clap::Args, Debug)]
struct ToonEncodeArgs {
    /// Items JSON file ('-' for stdin). Default: stdin.
    #[arg(long)]
    items: Option<PathBuf>,

    /// Comma-separated top-level fields to keep (applied per array element).
    #[arg(long)]
    fields: Option<String>,

    /// Cell delimiter for tabular rows and inline arrays.
    #[arg(long, value_enum, default_value = "comma")]
    delimiter: DelimiterArg,

    /// Fold single-key object chains into dotted paths.
    #[arg(long, value_enum, default_value = "off")]
    key_folding: FoldingArg,

    /// Maximum segments per folded path.
    #[arg(long)]
    flatten_depth: Option<usize>,

    /// Spaces per nesting level.
    #[arg(long, default_value_t = 2)]
    indent: usize,

    /// Attach token-savings metrics (compact JSON vs TOON).
    #[arg(long)]
    token_metrics: bool,

    /// Output field receiving the TOON text.
    #[arg(long, default_value = "data")]
    output_field: String,

    /// Print the bare TOON text instead of the item JSON.
    #[arg(long)]
    raw: bool,
}

#[derive(clap::Args, Debug)]
struct ToonDecodeArgs {
    /// TOON file to decode ('-' for stdin). Default: stdin.
    input: Option<PathBuf>,

    /// Accept length and row-width mismatches instead of erroring.
    #[arg(long)]
    lenient: bool,

    /// Split dotted keys back into nested objects.
    #[arg(long, value_enum, default_value = "off")]
    expand_paths: ExpandArg,

    /// Output field receiving the decoded value.
    #[arg(long, default_value = "data")]
    output_field: String,

    /// Record a parse failure as an outcome instead of aborting.
    #[arg(long)]
    continue_on_failure: bool,

    /// Print the bare decoded JSON instead of the item JSON.
    #[arg(long)]
    raw: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum DelimiterArg {
    Comma,
    Tab,
    Pipe,
}

impl From<DelimiterArg> for Delimiter {
    fn from(v: DelimiterArg) -> Self {
        match v {
            DelimiterArg::Comma => Delimiter::Comma,
            DelimiterArg::Tab => Delimiter::Tab,
            DelimiterArg::Pipe => Delimiter::Pipe,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum FoldingArg {
    Off,
    Safe,
}

impl From<FoldingArg> for KeyFolding {
    fn from(v: FoldingArg) -> Self {
        match v {
            FoldingArg::Off => KeyFolding::Off,
            FoldingArg::Safe => KeyFolding::Safe,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum ExpandArg {
    Off,
    Safe,
}

impl From<ExpandArg> for ExpandPaths {
    fn from(v: ExpandArg) -> Self {
        match v {
            ExpandArg::Off => ExpandPaths::Off,
            ExpandArg::Safe => ExpandPaths::Safe,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress =
        matches!(&cli.command, Command::Convert(args) if !args.no_progress) && !cli.quiet;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Run ──────────────────────────────────────────────────────────────
    let out = cli.out.clone();
    match cli.command {
        Command::Convert(args) => {
            run_convert(args, cli.quiet, out.as_deref(), show_progress).await
        }
        Command::Chat(args) => run_chat(args, cli.quiet, out.as_deref()).await,
        Command::Transcribe(args) => run_transcribe(args, cli.quiet, out.as_deref()).await,
        Command::Markdown(args) => run_markdown(args, cli.quiet, out.as_deref()).await,
        Command::Toon(ToonCommand::Encode(args)) => {
            run_toon_encode(args, cli.quiet, out.as_deref()).await
        }
        Command::Toon(ToonCommand::Decode(args)) => {
            run_toon_decode(args, cli.quiet, out.as_deref()).await
        }
    }
}

async fn run_convert(
    args: ConvertArgs,
    quiet: bool,
    out: Option<&Path>,
    show_progress: bool,
) -> Result<()> {
    let single_file = args.file.is_some();
    let items = match &args.file {
        Some(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let mut attachment = Attachment::new(bytes);
            if let Some(name) = path.file_name() {
                attachment = attachment.with_file_name(name.to_string_lossy());
            }
            let mut item = Item::new();
            item.set_attachment(args.binary_property.clone(), attachment);
            vec![item]
        }
        None => read_items(args.items.as_deref()).await?,
    };

    let mut builder = ConvertConfig::builder()
        .to_format(args.to)
        .output_field(args.output_field)
        .output_property(args.output_property)
        .passthrough(!args.no_passthrough)
        .continue_on_failure(args.continue_on_failure)
        .timeout(Duration::from_secs(args.timeout));

    builder = match args.text_field {
        Some(field) => builder.text_field(field),
        None => builder.binary_property(args.binary_property),
    };
    if let Some(from) = args.from {
        builder = builder.from_format(from);
    }
    if let Some(extra) = args.extra_args {
        builder = builder.extra_args(extra);
    }
    if let Some(pandoc) = args.pandoc {
        builder = builder.executable(pandoc);
    }
    if let Some(dir) = args.temp_dir {
        builder = builder.temp_dir(dir);
    }
    if show_progress {
        let cb = CliProgress::new_dynamic();
        builder = builder.progress(cb as Arc<dyn BatchProgress>);
    }
    let config = builder.build().context("Invalid configuration")?;

    let output = convert_items(&items, &config)
        .await
        .context("Conversion failed")?;
    let stats = output.stats.clone();

    if single_file && !args.json {
        // Bare document on stdout, the way a shell pipeline expects it.
        match output.outcomes.into_iter().next() {
            Some(ItemOutcome::Text { item, .. }) => {
                write_text(out, item.text_field(&config.output_field).unwrap_or(""))?;
            }
            Some(ItemOutcome::Binary { mut item, .. }) => {
                let bytes = item
                    .binary
                    .remove(&config.output_property)
                    .map(|a| a.data)
                    .unwrap_or_default();
                write_bytes(out, &bytes)?;
            }
            Some(ItemOutcome::Failed { error, .. }) => anyhow::bail!(error),
            None => {}
        }
    } else {
        emit_items(out, output)?;
    }

    // Summary (the observer already printed the final green/red tick).
    if !show_progress {
        print_summary(quiet, "converted", &stats);
    }
    Ok(())
}

async fn run_chat(args: ChatArgs, quiet: bool, out: Option<&Path>) -> Result<()> {
    let items = read_items(args.items.as_deref()).await?;

    let mut client = DashScopeClient::new(args.api_key);
    if let Some(base) = args.base_url {
        client = client.with_base_url(base);
    }

    let system_prompt = match args.system {
        Some(s) => read_text_arg(&s).await?,
        None => ChatConfig::default().system_prompt,
    };
    let message = match args.prompt {
        Some(p) => MessageSource::Fixed(read_text_arg(&p).await?),
        None => MessageSource::Field(args.prompt_field),
    };

    let config = ChatConfig {
        model: args.model,
        system_prompt,
        message,
        contexts: parse_contexts(&args.contexts)?,
        temperature: args.temperature,
        max_tokens: args.max_tokens,
        top_p: args.top_p,
        json_format: args.json_response,
        include_raw: args.full_response,
        continue_on_failure: args.continue_on_failure,
    };

    let output = chat_items(&client, &items, &config)
        .await
        .context("Chat completion failed")?;
    let stats = output.stats.clone();
    emit_items(out, output)?;
    print_summary(quiet, "completed", &stats);
    Ok(())
}

async fn run_transcribe(args: TranscribeArgs, quiet: bool, out: Option<&Path>) -> Result<()> {
    let items = read_items(args.items.as_deref()).await?;

    let mut client = DashScopeClient::new(args.api_key);
    if let Some(base) = args.base_url {
        client = client.with_base_url(base);
    }

    let source = match args.url {
        Some(url) => AudioSource::Url(url),
        None => AudioSource::BinaryProperty(args.binary_property),
    };
    let system_prompt = match args.context {
        Some(s) => read_text_arg(&s).await?,
        None => String::new(),
    };

    let config = TranscribeConfig {
        source,
        model: args.model,
        language: args.language,
        enable_itn: args.enable_itn,
        system_prompt,
        include_raw: args.full_response,
        continue_on_failure: args.continue_on_failure,
    };

    let output = transcribe_items(&client, &items, &config)
        .await
        .context("Transcription failed")?;
    let stats = output.stats.clone();
    emit_items(out, output)?;
    print_summary(quiet, "transcribed", &stats);
    Ok(())
}

async fn run_markdown(args: MarkdownArgs, quiet: bool, out: Option<&Path>) -> Result<()> {
    let content = read_text_arg(&args.content).await?;
    let items = match &args.items {
        Some(path) => read_items(Some(path)).await?,
        None => vec![Item::new()],
    };

    let config = MarkdownConfig {
        content,
        output_field: args.output_field,
        trim: !args.no_trim,
        keep_input: args.keep_input,
    };

    let output = stamp_items(&items, &config);
    let stats = output.stats.clone();
    emit_items(out, output)?;
    print_summary(quiet, "stamped", &stats);
    Ok(())
}

async fn run_toon_encode(args: ToonEncodeArgs, quiet: bool, out: Option<&Path>) -> Result<()> {
    let items = read_items(args.items.as_deref()).await?;

    let config = ToonEncodeConfig {
        output_field: args.output_field,
        selected_fields: args
            .fields
            .map(|f| f.split(',').map(str::to_string).collect())
            .unwrap_or_default(),
        options: EncodeOptions {
            indent: args.indent,
            delimiter: args.delimiter.into(),
            key_folding: args.key_folding.into(),
            flatten_depth: args.flatten_depth,
        },
        token_metrics: args.token_metrics,
    };

    let output = encode_items(&items, &config);
    let stats = output.stats.clone();
    if args.raw {
        let text = output
            .outcomes
            .first()
            .and_then(|o| o.item())
            .and_then(|i| i.text_field(&config.output_field))
            .unwrap_or("")
            .to_string();
        write_text(out, &text)?;
    } else {
        emit_items(out, output)?;
    }
    print_summary(quiet, "encoded", &stats);
    Ok(())
}

async fn run_toon_decode(args: ToonDecodeArgs, quiet: bool, out: Option<&Path>) -> Result<()> {
    let text = match &args.input {
        Some(path) if path.as_os_str() != "-" => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        _ => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            buf
        }
    };

    let config = ToonDecodeConfig {
        output_field: args.output_field,
        options: DecodeOptions {
            strict: !args.lenient,
            expand_paths: args.expand_paths.into(),
        },
        continue_on_failure: args.continue_on_failure,
    };

    let output = decode_text(&text, &config).context("TOON decode failed")?;
    let stats = output.stats.clone();
    if args.raw {
        let value = output
            .outcomes
            .first()
            .and_then(|o| o.item())
            .and_then(|i| i.field(&config.output_field))
            .cloned()
            .unwrap_or(Value::Null);
        let rendered =
            serde_json::to_string_pretty(&value).context("Failed to serialise value")?;
        write_text(out, &rendered)?;
    } else {
        emit_items(out, output)?;
    }
    print_summary(quiet, "decoded", &stats);
    Ok(())
}

/// Read an item batch from a file or stdin.
async fn read_items(path: Option<&Path>) -> Result<Vec<Item>> {
    let text = match path {
        Some(p) if p.as_os_str() != "-" => tokio::fs::read_to_string(p)
            .await
            .with_context(|| format!("Failed to read items from {}", p.display()))?,
        _ => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read items from stdin")?;
            buf
        }
    };
    let value: Value = serde_json::from_str(&text).context("Items input is not valid JSON")?;
    items_from_value(value).context("Items input is not a valid item batch")
}

/// Resolve a text argument: literal, `@path` for a file, `-` for stdin.
async fn read_text_arg(arg: &str) -> Result<String> {
    if arg == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read from stdin")?;
        Ok(buf)
    } else if let Some(path) = arg.strip_prefix('@') {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {path}"))
    } else {
        Ok(arg.to_string())
    }
}

/// Parse repeated `--context NAME[=FIELD]` values.
fn parse_contexts(specs: &[String]) -> Result<Vec<ContextSpec>> {
    specs
        .iter()
        .map(|spec| {
            let (name, field) = spec.split_once('=').unwrap_or((spec.as_str(), ""));
            if name.trim().is_empty() {
                anyhow::bail!("Invalid context '{spec}': expected NAME or NAME=FIELD");
            }
            let field = field.trim();
            Ok(ContextSpec {
                name: name.trim().to_string(),
                field: (!field.is_empty()).then(|| field.to_string()),
            })
        })
        .collect()
}

/// Print the outcomes as a JSON item array (failures become `{"error": …}`).
fn emit_items(out: Option<&Path>, output: BatchOutput) -> Result<()> {
    let items = output.into_items();
    let json = serde_json::to_string_pretty(&items).context("Failed to serialise items")?;
    write_text(out, &json)
}

fn write_text(out: Option<&Path>, text: &str) -> Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, format!("{text}\n"))
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(text.as_bytes())
                .context("Failed to write to stdout")?;
            // Ensure a trailing newline on stdout.
            if !text.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
    }
    Ok(())
}

fn write_bytes(out: Option<&Path>, bytes: &[u8]) -> Result<()> {
    match out {
        Some(path) => std::fs::write(path, bytes)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => io::stdout()
            .lock()
            .write_all(bytes)
            .context("Failed to write to stdout"),
    }
}

fn print_summary(quiet: bool, verb: &str, stats: &BatchStats) {
    if quiet {
        return;
    }
    let tick = if stats.failed == 0 {
        green("✔")
    } else if stats.converted == 0 {
        red("✘")
    } else {
        cyan("⚠")
    };
    eprintln!(
        "{} {}/{} items {} in {}ms",
        tick,
        bold(&stats.converted.to_string()),
        stats.total_items,
        verb,
        stats.total_duration_ms
    );
    if stats.failed > 0 {
        eprintln!("  {} items failed", red(&stats.failed.to_string()));
    }
}
