//! Converter invocation: argument-vector construction and process execution
//! under a wall-clock timeout.
//!
//! The executable is spawned with a literal argv — no shell ever parses any
//! of it, so caller-supplied tokens (including ones full of metacharacters)
//! cannot become commands. The only tokenisation applied to user input is
//! [`split_extra_args`], whitespace splitting of the raw extra-argument
//! string, and it happens once at request-construction time.
//!
//! Timeout handling leans on `kill_on_drop`: when the timeout elapses the
//! wait future is dropped, which kills the process, rather than leaving a
//! stray converter chewing on a document nobody will read.

use crate::error::ItemError;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Cap on the stderr excerpt carried inside [`ItemError::NonZeroExit`].
/// The full stderr is logged at debug level.
const STDERR_EXCERPT_BYTES: usize = 2048;

/// Split the raw extra-argument string into tokens.
///
/// Whitespace-separated; empty tokens are discarded. Quoting is deliberately
/// not supported — tokens are passed to the process verbatim, so there is
/// nothing a quote could protect.
pub fn split_extra_args(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Build the converter argument vector, in fixed order:
///
/// ```text
/// [-f <from>] -t <to> [extra ...] <input> -o <output>
/// ```
///
/// `from_token` is `None` when the converter should sniff the input format.
pub fn build_args(
    from_token: Option<&str>,
    to_token: &str,
    extra_args: &[String],
    input: &Path,
    output: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::with_capacity(extra_args.len() + 7);
    if let Some(from) = from_token {
        args.push("-f".into());
        args.push(from.into());
    }
    args.push("-t".into());
    args.push(to_token.into());
    for token in extra_args {
        args.push(OsString::from(token));
    }
    args.push(input.as_os_str().to_os_string());
    args.push("-o".into());
    args.push(output.as_os_str().to_os_string());
    args
}

/// Run the converter and wait for it, bounded by `timeout`.
///
/// Success means exit status zero, nothing more — whether the output file
/// actually exists is the output resolver's question.
pub async fn invoke(
    executable: &Path,
    args: &[OsString],
    timeout: Duration,
    index: usize,
) -> Result<(), ItemError> {
    debug!("item {}: running {:?} {:?}", index, executable, args);

    let mut command = Command::new(executable);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(|e| ItemError::SpawnFailed {
        index,
        executable: executable.to_path_buf(),
        detail: e.to_string(),
    })?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) if output.status.success() => Ok(()),
        Ok(Ok(output)) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                "item {}: converter exited with {:?}",
                index,
                output.status.code()
            );
            debug!("item {}: converter stderr: {}", index, stderr);
            Err(ItemError::NonZeroExit {
                index,
                exit_code: output.status.code(),
                stderr: excerpt(&stderr),
            })
        }
        Ok(Err(e)) => Err(ItemError::SpawnFailed {
            index,
            executable: executable.to_path_buf(),
            detail: format!("failed to collect converter output: {e}"),
        }),
        // Dropping the wait future kills the child (kill_on_drop).
        Err(_elapsed) => {
            warn!("item {}: converter killed after {:?}", index, timeout);
            Err(ItemError::Timeout {
                index,
                elapsed_ms: timeout.as_millis() as u64,
            })
        }
    }
}

fn excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.len() <= STDERR_EXCERPT_BYTES {
        return trimmed.to_string();
    }
    let mut cut = STDERR_EXCERPT_BYTES;
    while !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}… ({} bytes total)", &trimmed[..cut], trimmed.len())
}
