//! Pipeline stages for one document conversion.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and keeps the
//! temp-file lifecycle in one place (`stage`) instead of smeared across the
//! orchestrator.
//!
//! ## Data Flow
//!
//! ```text
//! format ──▶ stage ──▶ invoke ──▶ resolve
//! (lookup)  (tmp files) (pandoc)  (read back)
//! ```
//!
//! 1. [`format`]  — map logical format identifiers to file extensions, CLI
//!    tokens, and the binary/text output classification
//! 2. [`stage`]   — materialise the item's payload as an owner-only temp file
//!    and reserve the output path; both are deleted on drop
//! 3. [`invoke`]  — run the converter as a child process with a literal argv
//!    and a hard timeout; the only stage that leaves this process
//! 4. [`resolve`] — read the produced file back and shape it into a text
//!    field or a binary attachment

pub mod format;
pub mod invoke;
pub mod resolve;
pub mod stage;
