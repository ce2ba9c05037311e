//! Output formatter: turns an [`ExecutionOutcome`] into the text payload the
//! tool returns.
//!
//! Small outcomes are rendered inline. When the transcript grows past
//! [`MAX_INLINE_REPORT_CHARS`], the original structured data is serialized to
//! a JSON spill file and a compact summary pointing at it is returned
//! instead, so the response stays bounded without truncating anything.

use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use serde_json::json;

use crate::engine::ExecutionOutcome;
use crate::highlight::highlight_python;

/// Transcripts longer than this are spilled to a JSON file.
pub const MAX_INLINE_REPORT_CHARS: usize = 1000;

const REPORT_SPILL_PREFIX: &str = "execute_code_output_";
const REPORT_SPILL_SUFFIX: &str = ".json";

/// A rendered report: either the full transcript, or a pointer summary for a
/// transcript that was spilled to disk.
#[derive(Debug)]
pub enum RenderedReport {
    Inline(String),
    Spilled { path: PathBuf, summary: String },
}

impl RenderedReport {
    pub fn text(&self) -> &str {
        match self {
            RenderedReport::Inline(text) => text,
            RenderedReport::Spilled { summary, .. } => summary,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            RenderedReport::Inline(text) => text,
            RenderedReport::Spilled { summary, .. } => summary,
        }
    }
}

/// Render one outcome. Does not fail on any valid outcome; an `Err` here
/// means the spill file could not be created, which is an environment error
/// the caller must surface.
pub fn render(outcome: &ExecutionOutcome, code: &str) -> io::Result<RenderedReport> {
    let transcript = build_transcript(outcome, code);
    if transcript.chars().count() <= MAX_INLINE_REPORT_CHARS {
        return Ok(RenderedReport::Inline(transcript));
    }

    let path = spill_outcome(outcome, code)?;
    let summary = build_summary(code, &path);
    Ok(RenderedReport::Spilled { path, summary })
}

fn build_transcript(outcome: &ExecutionOutcome, code: &str) -> String {
    let mut lines = Vec::new();
    lines.push(highlight_python(code));
    lines.push(String::new());

    if outcome.success {
        lines.push("\u{2713} Execution successful".to_string());
        if let Some(result) = &outcome.result {
            lines.push(format!("\nResult:\n{result}"));
        }
    } else {
        lines.push("\u{2717} Execution failed".to_string());
        if let Some(error) = &outcome.error {
            lines.push(format!("\nError: {error}"));
        }
    }

    if !outcome.stdout.is_empty() {
        lines.push(format!("\nStdout:\n{}", outcome.stdout));
    }
    if !outcome.stderr.is_empty() {
        lines.push(format!("\nStderr:\n{}", outcome.stderr));
    }
    if let Some(path) = &outcome.result_file {
        lines.push(format!(
            "\n\u{1f4c1} Large result saved to: {}",
            path.display()
        ));
    }

    lines.join("\n")
}

/// Serialize the undecorated structured data to a uniquely named JSON file in
/// the OS temp dir. The file is left on disk for the caller to read.
fn spill_outcome(outcome: &ExecutionOutcome, code: &str) -> io::Result<PathBuf> {
    let document = json!({
        "code": code,
        "result": outcome.result,
        "stdout": outcome.stdout,
        "stderr": outcome.stderr,
        "success": outcome.success,
        "error": outcome.error.as_ref().map(|error| {
            json!({ "kind": error.kind, "message": error.message })
        }),
    });

    let mut file = tempfile::Builder::new()
        .prefix(REPORT_SPILL_PREFIX)
        .suffix(REPORT_SPILL_SUFFIX)
        .tempfile()?;
    serde_json::to_writer_pretty(&mut file, &document)?;
    file.flush()?;
    let (_, path) = file.keep().map_err(|err| err.error)?;
    Ok(path)
}

fn build_summary(code: &str, path: &Path) -> String {
    let path = path.display();
    let mut lines = Vec::new();
    lines.push(highlight_python(code));
    lines.push(String::new());
    lines.push(format!("\u{2713} Output saved to: {path}"));
    lines.push("\nThe JSON file contains:".to_string());
    lines.push("  - code: The executed Python code".to_string());
    lines.push("  - result: The value of the 'result' variable (if set)".to_string());
    lines.push("  - stdout: Standard output from the code".to_string());
    lines.push("  - stderr: Standard error output".to_string());
    lines.push("  - success: Whether execution succeeded".to_string());
    lines.push("  - error: Error kind and message (if any)".to_string());
    lines.push(format!("\nTo access this data, read the file: {path}"));
    lines.join("\n")
}
