//! End-to-end tests for the document conversion pipeline.
//!
//! Most tests drive `convert_items` against small `/bin/sh` scripts that
//! play the converter role, so they need no pandoc install and run on any
//! Unix machine. Input-side failures never reach the executable, and those
//! tests run everywhere.
//!
//! One live test exercises a real pandoc binary. It is gated behind the
//! `PANDOC_E2E` environment variable so it does not run in CI by default:
//!
//!   PANDOC_E2E=1 cargo test --test convert_pipeline -- --nocapture

use docmill::{
    convert_items, Attachment, ConvertConfig, DocmillError, Item, ItemError, ItemOutcome,
};
use serde_json::json;

#[cfg(unix)]
use docmill::ConvertConfigBuilder;
use std::path::Path;
#[cfg(unix)]
use std::path::PathBuf;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn text_item(field: &str, content: &str) -> Item {
    let mut item = Item::new();
    item.set_field(field, json!(content));
    item
}

#[cfg(unix)]
fn doc_item(bytes: &[u8], file_name: &str) -> Item {
    let mut item = Item::new();
    item.set_attachment(
        "data",
        Attachment::new(bytes.to_vec()).with_file_name(file_name),
    );
    item
}

/// Write an executable `#!/bin/sh` script that plays the converter role.
///
/// The pipeline invokes the executable as `[-f X] -t Y [extra..] <input> -o
/// <output>`; the prelude recovers the two paths so each script body only has
/// to read `$in` and write `$out`.
#[cfg(unix)]
fn fake_converter(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let prelude = r#"#!/bin/sh
in=''; out=''; last=''
for a in "$@"; do
  case "$last" in -o) out="$a";; esac
  case "$a" in -o) in="$last";; esac
  last="$a"
done
"#;
    let path = dir.join(name);
    std::fs::write(&path, format!("{prelude}{body}\n")).expect("write fake converter script");
    let mut perms = std::fs::metadata(&path)
        .expect("stat fake converter")
        .permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("mark fake converter executable");
    path
}

/// Config pre-wired to a fake converter and a private staging directory.
#[cfg(unix)]
fn script_config(script: &Path, staging: &Path) -> ConvertConfigBuilder {
    ConvertConfig::builder()
        .executable(script)
        .temp_dir(staging)
}

/// Every conversion attempt must leave the staging directory exactly as it
/// found it, whatever the outcome.
fn assert_staging_empty(dir: &Path, context: &str) {
    let leftovers: Vec<_> = std::fs::read_dir(dir)
        .expect("read staging dir")
        .map(|e| e.expect("dir entry").file_name())
        .collect();
    assert!(
        leftovers.is_empty(),
        "[{context}] staged temp files leaked: {leftovers:?}"
    );
}

fn pandoc_executable() -> String {
    std::env::var("PANDOC_PATH").unwrap_or_else(|_| "pandoc".to_string())
}

/// Helper: check whether a real pandoc binary is runnable.
async fn pandoc_is_available() -> bool {
    tokio::process::Command::new(pandoc_executable())
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

// ── Input-side failures (portable, the converter is never run) ───────────────

#[tokio::test]
async fn missing_attachment_fails_without_running_the_converter() {
    // The executable path is unspawnable; reaching it would turn this
    // failure into SpawnFailed.
    let config = ConvertConfig::builder()
        .executable("/nonexistent/docmill-test-converter")
        .continue_on_failure(true)
        .build()
        .expect("valid config");

    let output = convert_items(&[Item::new()], &config)
        .await
        .expect("continue-on-failure run returns outcomes");

    assert_eq!(output.stats.total_items, 1);
    assert_eq!(output.stats.failed, 1);
    match output.outcomes[0].error() {
        Some(ItemError::AttachmentMissing { index, property }) => {
            assert_eq!(*index, 0);
            assert_eq!(property, "data");
        }
        other => panic!("expected AttachmentMissing, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_or_non_string_field_is_reported() {
    let config = ConvertConfig::builder()
        .executable("/nonexistent/docmill-test-converter")
        .text_field("doc")
        .build()
        .expect("valid config");

    // Field absent entirely.
    let err = convert_items(&[Item::new()], &config)
        .await
        .expect_err("fail-fast run must abort");
    match err {
        DocmillError::Item(ItemError::FieldMissing { index, field }) => {
            assert_eq!(index, 0);
            assert_eq!(field, "doc");
        }
        other => panic!("expected FieldMissing, got {other:?}"),
    }

    // Field present but not a string.
    let mut item = Item::new();
    item.set_field("doc", json!(42));
    let err = convert_items(&[item], &config)
        .await
        .expect_err("numeric field must not be staged");
    match err {
        DocmillError::Item(ItemError::FieldMissing { field, .. }) => assert_eq!(field, "doc"),
        other => panic!("expected FieldMissing, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_payloads_are_rejected() {
    // Empty attachment bytes.
    let config = ConvertConfig::builder()
        .executable("/nonexistent/docmill-test-converter")
        .build()
        .expect("valid config");
    let mut item = Item::new();
    item.set_attachment("data", Attachment::new(Vec::new()));
    let err = convert_items(&[item], &config)
        .await
        .expect_err("empty attachment must abort");
    assert!(
        matches!(err, DocmillError::Item(ItemError::EmptySource { index: 0 })),
        "got {err:?}"
    );

    // Empty text field.
    let config = ConvertConfig::builder()
        .executable("/nonexistent/docmill-test-converter")
        .text_field("doc")
        .build()
        .expect("valid config");
    let err = convert_items(&[text_item("doc", "")], &config)
        .await
        .expect_err("empty text must abort");
    assert!(
        matches!(err, DocmillError::Item(ItemError::EmptySource { index: 0 })),
        "got {err:?}"
    );
}

#[tokio::test]
async fn spawn_failure_names_the_executable() {
    let config = ConvertConfig::builder()
        .executable("/nonexistent/docmill-test-converter")
        .text_field("doc")
        .continue_on_failure(true)
        .build()
        .expect("valid config");

    let output = convert_items(&[text_item("doc", "some content")], &config)
        .await
        .expect("continue-on-failure run returns outcomes");

    let error = output.outcomes[0].error().expect("item must fail");
    match error {
        ItemError::SpawnFailed { executable, .. } => {
            assert!(executable.ends_with("docmill-test-converter"));
        }
        other => panic!("expected SpawnFailed, got {other:?}"),
    }
    // The message should point at the usual fix.
    assert!(
        error.to_string().contains("PANDOC_PATH"),
        "got: {error}"
    );
}

// ── Fake-converter runs (Unix) ───────────────────────────────────────────────

#[cfg(unix)]
#[tokio::test]
async fn text_target_lands_in_output_field() {
    let scripts = tempfile::tempdir().expect("script dir");
    let staging = tempfile::tempdir().expect("staging dir");
    let script = fake_converter(
        scripts.path(),
        "upper.sh",
        r#"tr '[:lower:]' '[:upper:]' < "$in" > "$out""#,
    );

    let mut item = text_item("html", "<p>hello</p>");
    item.set_field("title", json!("greeting"));

    let config = script_config(&script, staging.path())
        .text_field("html")
        .from_format("html")
        .to_format("markdown")
        .build()
        .expect("valid config");

    let output = convert_items(&[item], &config)
        .await
        .expect("batch should succeed");

    assert_eq!(output.stats.total_items, 1);
    assert_eq!(output.stats.converted, 1);
    assert_eq!(output.stats.failed, 0);

    let outcome = &output.outcomes[0];
    assert!(
        matches!(outcome, ItemOutcome::Text { .. }),
        "a markdown target must yield a Text outcome"
    );
    let converted = outcome.item().expect("success carries an item");
    assert_eq!(converted.text_field("text"), Some("<P>HELLO</P>"));
    // Passthrough keeps the input fields alongside the converted content.
    assert_eq!(converted.text_field("html"), Some("<p>hello</p>"));
    assert_eq!(converted.text_field("title"), Some("greeting"));

    assert_staging_empty(staging.path(), "text-target");
}

#[cfg(unix)]
#[tokio::test]
async fn binary_target_becomes_named_attachment() {
    let scripts = tempfile::tempdir().expect("script dir");
    let staging = tempfile::tempdir().expect("staging dir");
    let script = fake_converter(
        scripts.path(),
        "emit.sh",
        r#"printf 'PK\003\004fake' > "$out""#,
    );

    let config = script_config(&script, staging.path())
        .text_field("text")
        .from_format("markdown")
        .to_format("docx")
        .build()
        .expect("valid config");

    let output = convert_items(&[text_item("text", "# Title")], &config)
        .await
        .expect("batch should succeed");

    let outcome = &output.outcomes[0];
    assert!(
        matches!(outcome, ItemOutcome::Binary { .. }),
        "a docx target must yield a Binary outcome"
    );
    let converted = outcome.item().expect("success carries an item");
    let attachment = converted
        .attachment("data")
        .expect("produced bytes land under the default output property");
    assert_eq!(attachment.data, b"PK\x03\x04fake".to_vec());
    assert_eq!(attachment.file_name.as_deref(), Some("output.docx"));
    let mime = attachment.mime_type.as_deref().unwrap_or("");
    assert!(
        mime.contains("officedocument"),
        "docx must get the OOXML mime type, got: {mime}"
    );
    // Passthrough still applies to the JSON half.
    assert_eq!(converted.text_field("text"), Some("# Title"));

    assert_staging_empty(staging.path(), "binary-target");
}

#[cfg(unix)]
#[tokio::test]
async fn converted_content_wins_over_passthrough_field() {
    let scripts = tempfile::tempdir().expect("script dir");
    let staging = tempfile::tempdir().expect("staging dir");
    let script = fake_converter(
        scripts.path(),
        "upper.sh",
        r#"tr '[:lower:]' '[:upper:]' < "$in" > "$out""#,
    );

    // The input already has a field with the output's name; the converted
    // content must replace it, not the other way round.
    let mut item = text_item("html", "<b>new</b>");
    item.set_field("text", json!("stale value"));

    let config = script_config(&script, staging.path())
        .text_field("html")
        .from_format("html")
        .build()
        .expect("valid config");

    let output = convert_items(&[item], &config)
        .await
        .expect("batch should succeed");
    let converted = output.outcomes[0].item().expect("success");
    assert_eq!(converted.text_field("text"), Some("<B>NEW</B>"));
}

#[cfg(unix)]
#[tokio::test]
async fn passthrough_off_drops_input_fields() {
    let scripts = tempfile::tempdir().expect("script dir");
    let staging = tempfile::tempdir().expect("staging dir");
    let script = fake_converter(scripts.path(), "copy.sh", r#"cat "$in" > "$out""#);

    let mut item = text_item("html", "<p>x</p>");
    item.set_field("title", json!("dropped"));

    let config = script_config(&script, staging.path())
        .text_field("html")
        .from_format("html")
        .passthrough(false)
        .build()
        .expect("valid config");

    let output = convert_items(&[item], &config)
        .await
        .expect("batch should succeed");
    let converted = output.outcomes[0].item().expect("success");
    assert_eq!(converted.json.len(), 1, "only the output field survives");
    assert_eq!(converted.text_field("text"), Some("<p>x</p>"));
    assert!(converted.text_field("html").is_none());
    assert!(converted.text_field("title").is_none());
}

#[cfg(unix)]
#[tokio::test]
async fn converter_receives_the_documented_argv() {
    let scripts = tempfile::tempdir().expect("script dir");
    let staging = tempfile::tempdir().expect("staging dir");
    let argv_file = scripts.path().join("argv.txt");
    let body = format!(
        r#"printf '%s\n' "$@" > "{}"
cat "$in" > "$out""#,
        argv_file.display()
    );
    let script = fake_converter(scripts.path(), "record.sh", &body);

    let config = script_config(&script, staging.path())
        .text_field("page")
        .from_format("html")
        .to_format("markdown")
        .extra_args("--wrap=none --standalone")
        .build()
        .expect("valid config");

    convert_items(&[text_item("page", "<p>x</p>")], &config)
        .await
        .expect("batch should succeed");

    let recorded = std::fs::read_to_string(&argv_file).expect("argv recording");
    let argv: Vec<&str> = recorded.lines().collect();
    assert_eq!(argv.len(), 9, "argv: {argv:?}");
    assert_eq!(
        &argv[..6],
        ["-f", "html", "-t", "markdown", "--wrap=none", "--standalone"]
    );
    assert!(
        argv[6].contains("docmill-") && argv[6].ends_with(".html"),
        "staged input must carry the source extension: {}",
        argv[6]
    );
    assert_eq!(argv[7], "-o");
    assert!(
        argv[8].ends_with("-out.md"),
        "reserved output path must carry the target extension: {}",
        argv[8]
    );
}

#[cfg(unix)]
#[tokio::test]
async fn attachment_input_stages_with_the_declared_extension() {
    let scripts = tempfile::tempdir().expect("script dir");
    let staging = tempfile::tempdir().expect("staging dir");
    let argv_file = scripts.path().join("argv.txt");
    let body = format!(
        r#"printf '%s\n' "$@" > "{}"
cat "$in" > "$out""#,
        argv_file.display()
    );
    let script = fake_converter(scripts.path(), "record.sh", &body);

    // No from-format: the converter sniffs, and the staged file borrows the
    // upstream-declared filename's extension.
    let config = script_config(&script, staging.path())
        .binary_property("data")
        .to_format("markdown")
        .build()
        .expect("valid config");

    let output = convert_items(&[doc_item(b"<p>doc</p>", "page.html")], &config)
        .await
        .expect("batch should succeed");

    let recorded = std::fs::read_to_string(&argv_file).expect("argv recording");
    let argv: Vec<&str> = recorded.lines().collect();
    assert_eq!(argv.len(), 5, "no -f token when the format is sniffed: {argv:?}");
    assert_eq!(argv[0], "-t");
    assert!(
        argv[2].ends_with(".html"),
        "staged name should borrow the declared extension: {}",
        argv[2]
    );

    let converted = output.outcomes[0].item().expect("success");
    assert_eq!(converted.text_field("text"), Some("<p>doc</p>"));
    assert!(
        converted.binary.is_empty(),
        "source attachments are not echoed into text outputs"
    );
}

#[cfg(unix)]
#[tokio::test]
async fn converter_failure_carries_exit_code_and_stderr() {
    let scripts = tempfile::tempdir().expect("script dir");
    let staging = tempfile::tempdir().expect("staging dir");
    let script = fake_converter(
        scripts.path(),
        "flaky.sh",
        r#"if grep -q FAIL "$in"; then
  echo 'boom: unsupported construct' >&2
  exit 21
fi
tr '[:lower:]' '[:upper:]' < "$in" > "$out""#,
    );

    let items = vec![
        text_item("doc", "alpha section"),
        text_item("doc", "FAIL marker line"),
        text_item("doc", "gamma section"),
    ];
    let config = script_config(&script, staging.path())
        .text_field("doc")
        .from_format("markdown")
        .to_format("html")
        .continue_on_failure(true)
        .build()
        .expect("valid config");

    let output = convert_items(&items, &config)
        .await
        .expect("continue-on-failure run returns outcomes");

    assert_eq!(output.stats.total_items, 3);
    assert_eq!(output.stats.converted, 2);
    assert_eq!(output.stats.failed, 1);

    // Outcomes stay aligned with input positions.
    let indices: Vec<usize> = output.outcomes.iter().map(|o| o.index()).collect();
    assert_eq!(indices, vec![0, 1, 2]);

    let first = output.outcomes[0].item().expect("item 0 converts");
    assert_eq!(first.text_field("text"), Some("ALPHA SECTION"));
    let last = output.outcomes[2].item().expect("item 2 converts");
    assert_eq!(last.text_field("text"), Some("GAMMA SECTION"));

    match output.outcomes[1].error() {
        Some(ItemError::NonZeroExit {
            index,
            exit_code,
            stderr,
        }) => {
            assert_eq!(*index, 1);
            assert_eq!(*exit_code, Some(21));
            assert!(stderr.contains("boom"), "stderr excerpt lost: {stderr}");
        }
        other => panic!("expected NonZeroExit, got {other:?}"),
    }

    assert_staging_empty(staging.path(), "continue-on-failure");
}

#[cfg(unix)]
#[tokio::test]
async fn fail_fast_aborts_and_skips_remaining_items() {
    let scripts = tempfile::tempdir().expect("script dir");
    let staging = tempfile::tempdir().expect("staging dir");
    let calls_log = scripts.path().join("calls.log");
    let body = format!(
        r#"echo ran >> "{}"
if grep -q FAIL "$in"; then exit 7; fi
cat "$in" > "$out""#,
        calls_log.display()
    );
    let script = fake_converter(scripts.path(), "counting.sh", &body);

    let items = vec![
        text_item("doc", "first"),
        text_item("doc", "FAIL"),
        text_item("doc", "third"),
    ];
    let config = script_config(&script, staging.path())
        .text_field("doc")
        .from_format("markdown")
        .to_format("html")
        .build()
        .expect("valid config");

    let err = convert_items(&items, &config)
        .await
        .expect_err("fail-fast must abort the run");
    match err {
        DocmillError::Item(ItemError::NonZeroExit { index, .. }) => assert_eq!(index, 1),
        other => panic!("expected the item error to propagate, got {other:?}"),
    }

    let calls = std::fs::read_to_string(&calls_log).expect("calls log");
    assert_eq!(
        calls.lines().count(),
        2,
        "item 2 must never be attempted after the abort"
    );
    assert_staging_empty(staging.path(), "fail-fast");
}

#[cfg(unix)]
#[tokio::test]
async fn timeout_kills_a_hung_converter() {
    use std::time::{Duration, Instant};

    let scripts = tempfile::tempdir().expect("script dir");
    let staging = tempfile::tempdir().expect("staging dir");
    let script = fake_converter(scripts.path(), "hang.sh", "sleep 30");

    let config = script_config(&script, staging.path())
        .text_field("doc")
        .from_format("markdown")
        .to_format("html")
        .timeout(Duration::from_millis(250))
        .continue_on_failure(true)
        .build()
        .expect("valid config");

    let started = Instant::now();
    let output = convert_items(&[text_item("doc", "slow document")], &config)
        .await
        .expect("continue-on-failure run returns outcomes");
    assert!(
        started.elapsed() < Duration::from_secs(10),
        "the hung converter must be killed, not awaited"
    );

    match output.outcomes[0].error() {
        Some(ItemError::Timeout { index, elapsed_ms }) => {
            assert_eq!(*index, 0);
            assert_eq!(*elapsed_ms, 250);
        }
        other => panic!("expected Timeout, got {other:?}"),
    }

    assert_staging_empty(staging.path(), "timeout");
}

#[cfg(unix)]
#[tokio::test]
async fn clean_exit_with_no_output_file_is_missing_output() {
    let scripts = tempfile::tempdir().expect("script dir");
    let staging = tempfile::tempdir().expect("staging dir");
    let script = fake_converter(scripts.path(), "silent.sh", "exit 0");

    let config = script_config(&script, staging.path())
        .text_field("doc")
        .from_format("markdown")
        .to_format("html")
        .continue_on_failure(true)
        .build()
        .expect("valid config");

    let output = convert_items(&[text_item("doc", "content")], &config)
        .await
        .expect("continue-on-failure run returns outcomes");

    match output.outcomes[0].error() {
        Some(ItemError::MissingOutput { index, detail }) => {
            assert_eq!(*index, 0);
            assert!(
                detail.contains("-out."),
                "detail should name the missing path: {detail}"
            );
        }
        other => panic!("expected MissingOutput, got {other:?}"),
    }

    assert_staging_empty(staging.path(), "missing-output");
}

// ── Streaming API (Unix) ─────────────────────────────────────────────────────

#[cfg(unix)]
#[tokio::test]
async fn stream_yields_outcomes_in_input_order() {
    use docmill::convert_stream;
    use futures::StreamExt;

    let scripts = tempfile::tempdir().expect("script dir");
    let staging = tempfile::tempdir().expect("staging dir");
    let script = fake_converter(
        scripts.path(),
        "upper.sh",
        r#"tr '[:lower:]' '[:upper:]' < "$in" > "$out""#,
    );

    let items = vec![
        text_item("doc", "one"),
        text_item("doc", "two"),
        text_item("doc", "three"),
    ];
    let config = script_config(&script, staging.path())
        .text_field("doc")
        .from_format("markdown")
        .to_format("html")
        .build()
        .expect("valid config");

    let results: Vec<Result<ItemOutcome, ItemError>> =
        convert_stream(items, &config).collect().await;

    assert_eq!(results.len(), 3);
    for (position, result) in results.iter().enumerate() {
        let outcome = result.as_ref().expect("all items convert");
        assert_eq!(outcome.index(), position);
    }
    let texts: Vec<&str> = results
        .iter()
        .map(|r| {
            r.as_ref()
                .expect("success")
                .item()
                .expect("item")
                .text_field("text")
                .expect("converted content")
        })
        .collect();
    assert_eq!(texts, vec!["ONE", "TWO", "THREE"]);

    assert_staging_empty(staging.path(), "stream-ordered");
}

#[cfg(unix)]
#[tokio::test]
async fn stream_continues_past_failures() {
    use docmill::convert_stream;
    use futures::StreamExt;

    let scripts = tempfile::tempdir().expect("script dir");
    let staging = tempfile::tempdir().expect("staging dir");
    let script = fake_converter(
        scripts.path(),
        "flaky.sh",
        r#"if grep -q FAIL "$in"; then exit 3; fi
cat "$in" > "$out""#,
    );

    let items = vec![
        text_item("doc", "good"),
        text_item("doc", "FAIL"),
        text_item("doc", "also good"),
    ];
    // The stream has no fail-fast switch; errors arrive as elements and the
    // stream runs to the end of the input regardless.
    let config = script_config(&script, staging.path())
        .text_field("doc")
        .from_format("markdown")
        .to_format("html")
        .build()
        .expect("valid config");

    let results: Vec<Result<ItemOutcome, ItemError>> =
        convert_stream(items, &config).collect().await;

    assert_eq!(results.len(), 3, "one element per input item");
    assert!(results[0].is_ok());
    assert!(
        matches!(
            results[1],
            Err(ItemError::NonZeroExit {
                index: 1,
                exit_code: Some(3),
                ..
            })
        ),
        "got {:?}",
        results[1]
    );
    assert!(results[2].is_ok(), "items after a failure still convert");

    assert_staging_empty(staging.path(), "stream-failures");
}

// ── Progress observer (Unix) ─────────────────────────────────────────────────

#[cfg(unix)]
#[tokio::test]
async fn observer_sees_every_item_event() {
    use docmill::BatchProgress;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct BatchLog {
        run_total: AtomicUsize,
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        run_success: AtomicUsize,
    }

    impl BatchProgress for BatchLog {
        fn on_run_start(&self, total_items: usize) {
            self.run_total.store(total_items, Ordering::SeqCst);
        }
        fn on_item_start(&self, _index: usize, _total_items: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        fn on_item_complete(&self, _index: usize, _total_items: usize, output_len: usize) {
            assert!(output_len > 0, "successful items report their output size");
            self.completes.fetch_add(1, Ordering::SeqCst);
        }
        fn on_item_error(&self, _index: usize, _total_items: usize, error: &str) {
            assert!(error.contains("Item"), "error text should name the item: {error}");
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
        fn on_run_complete(&self, _total_items: usize, success_count: usize) {
            self.run_success.store(success_count, Ordering::SeqCst);
        }
    }

    let scripts = tempfile::tempdir().expect("script dir");
    let staging = tempfile::tempdir().expect("staging dir");
    let script = fake_converter(
        scripts.path(),
        "flaky.sh",
        r#"if grep -q FAIL "$in"; then exit 3; fi
cat "$in" > "$out""#,
    );

    let log = Arc::new(BatchLog::default());
    let items = vec![
        text_item("doc", "good"),
        text_item("doc", "FAIL"),
        text_item("doc", "also good"),
    ];
    let config = script_config(&script, staging.path())
        .text_field("doc")
        .from_format("markdown")
        .to_format("html")
        .continue_on_failure(true)
        .progress(Arc::clone(&log) as Arc<dyn BatchProgress>)
        .build()
        .expect("valid config");

    convert_items(&items, &config)
        .await
        .expect("continue-on-failure run returns outcomes");

    assert_eq!(log.run_total.load(Ordering::SeqCst), 3);
    assert_eq!(log.starts.load(Ordering::SeqCst), 3);
    assert_eq!(log.completes.load(Ordering::SeqCst), 2);
    assert_eq!(log.errors.load(Ordering::SeqCst), 1);
    assert_eq!(log.run_success.load(Ordering::SeqCst), 2);
}

// ── Live pandoc (gated) ──────────────────────────────────────────────────────

#[tokio::test]
async fn live_pandoc_markdown_to_html() {
    if std::env::var("PANDOC_E2E").is_err() {
        println!("SKIP — set PANDOC_E2E=1 to run live pandoc tests");
        return;
    }
    if !pandoc_is_available().await {
        println!("SKIP — pandoc not reachable (install it or set PANDOC_PATH)");
        return;
    }

    let staging = tempfile::tempdir().expect("staging dir");
    let config = ConvertConfig::builder()
        .executable(pandoc_executable())
        .temp_dir(staging.path())
        .text_field("md")
        .from_format("markdown")
        .to_format("html")
        .build()
        .expect("valid config");

    let output = convert_items(
        &[text_item("md", "# Heading\n\nSome *emphasis* here.\n")],
        &config,
    )
    .await
    .expect("live pandoc conversion should succeed");

    assert_eq!(output.stats.converted, 1);
    let html = output.outcomes[0]
        .item()
        .expect("success")
        .text_field("text")
        .expect("converted content")
        .to_string();
    assert!(html.contains("<h1"), "expected an <h1> tag, got: {html}");
    assert!(
        html.contains("<em>emphasis</em>"),
        "expected emphasis markup, got: {html}"
    );

    assert_staging_empty(staging.path(), "live-pandoc");
    println!("[live-pandoc] {} bytes of HTML", html.len());
}
