//! Progress and summary formatting for the publish CLI.
//!
//! Everything here produces plain text for stderr. The final summary lists
//! every artefact with its outcome so a caller can retry only the failures.

use crate::batch::{BatchReport, BatchVerdict};
use crate::resolution::Artefact;
use crate::upload::UploadOutcome;
use std::fmt;
use std::io::Write;

/// Write one line to `stderr`, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort output; ignore write failures.
    }
}

/// Announce the start of the upload loop.
///
/// # Example
///
/// ```
/// use pilet_publish::output::batch_header;
///
/// assert_eq!(
///     batch_header(2, "https://feed.example/api"),
///     "Publishing 2 artefacts to https://feed.example/api..."
/// );
/// ```
#[must_use]
pub fn batch_header(count: usize, feed_url: &str) -> String {
    let noun = if count == 1 { "artefact" } else { "artefacts" };
    format!("Publishing {count} {noun} to {feed_url}...")
}

/// Line printed before an upload attempt; `index` is zero-based.
#[must_use]
pub fn progress_line(index: usize, total: usize, artefact: &Artefact) -> String {
    format!("[{}/{total}] Uploading {}...", index + 1, artefact.path)
}

/// One-line description of an outcome.
#[must_use]
pub fn outcome_line(outcome: &UploadOutcome) -> String {
    let path = &outcome.artefact.path;
    let mut line = if outcome.success {
        format!("  ok      {path}")
    } else {
        format!("  failed  {path}: {}", outcome.classification)
    };
    if let Some(status) = outcome.http_status {
        line.push_str(&format!(" (HTTP {status})"));
    }
    if let Some(detail) = outcome.detail.as_deref().filter(|d| !d.is_empty()) {
        line.push_str(&format!(" - {detail}"));
    }
    line
}

/// Response body excerpt worth showing for a failed upload.
#[must_use]
pub fn failure_body(outcome: &UploadOutcome) -> Option<String> {
    const MAX_CHARS: usize = 200;

    let body = outcome.response_body.as_deref()?.trim();
    if outcome.success || body.is_empty() {
        return None;
    }
    let mut excerpt: String = body.chars().take(MAX_CHARS).collect();
    if body.chars().nth(MAX_CHARS).is_some() {
        excerpt.push_str("...");
    }
    Some(format!("          {excerpt}"))
}

/// Summary lines for a finished batch.
#[must_use]
pub fn summary_lines(report: &BatchReport) -> Vec<String> {
    let total = report.outcomes().len();
    let mut lines = vec![String::new()];
    lines.extend(report.outcomes().iter().map(outcome_line));
    lines.push(String::new());
    lines.push(match report.verdict() {
        BatchVerdict::Success => format!("Published {total} of {total} artefact(s)."),
        BatchVerdict::PartialOrFullUploadFailure => format!(
            "{} of {total} upload(s) failed; {} succeeded.",
            report.failures().count(),
            report.success_count()
        ),
    });
    lines
}
