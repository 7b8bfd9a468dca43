//! The result `apply_patch` always produces. Every run — clean, partially
//! failed, or fully failed — ends in a [`Report`], never a bare `Err`.

use crate::error::ApError;
use colored::Colorize;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// One modification that could not be located or applied.
#[derive(Debug, Clone, Serialize)]
pub struct FailedModification {
    pub file_path: PathBuf,
    pub mod_index: usize,
    pub error: ApError,
}

/// One file that was actually written (or would have been, in dry-run).
#[derive(Debug, Clone, Serialize)]
pub struct AppliedFile {
    pub file_path: PathBuf,
    pub modifications_applied: usize,
    pub modifications_skipped: usize,
}

/// The complete outcome of one `apply_patch` call.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub patch_id: String,
    pub dry_run: bool,
    pub force: bool,
    pub applied: Vec<AppliedFile>,
    pub failed: Vec<FailedModification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_report_path: Option<PathBuf>,
}

impl Report {
    pub fn new(patch_id: impl Into<String>, dry_run: bool, force: bool) -> Self {
        Self {
            patch_id: patch_id.into(),
            dry_run,
            force,
            applied: Vec::new(),
            failed: Vec::new(),
            failure_report_path: None,
        }
    }

    /// A patch is a success iff every modification that was attempted either
    /// applied or was already satisfied — `ALL_CHANGES_FAILED` and ordinary
    /// partial failures both fail this check.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize report: {e}\"}}"))
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            writeln!(f, "{}", "DRY RUN — no files were modified".yellow().bold())?;
        }

        for file in &self.applied {
            writeln!(
                f,
                "{} {} ({} applied, {} already satisfied)",
                "ok:".green().bold(),
                file.file_path.display(),
                file.modifications_applied,
                file.modifications_skipped
            )?;
        }

        for failure in &self.failed {
            writeln!(
                f,
                "{} {} [modification {}]: {}",
                "error:".red().bold(),
                failure.file_path.display(),
                failure.mod_index,
                failure.error
            )?;
            if let Some(preview) = failure.error.context.get("search_space_preview").and_then(|v| v.as_str()) {
                writeln!(f, "    searched near:\n{}", indent(preview, 6))?;
            }
            if let Some(fuzzy) = failure.error.context.get("fuzzy_matches").and_then(|v| v.as_array()) {
                for candidate in fuzzy {
                    if let (Some(line), Some(score)) = (
                        candidate.get("line_number").and_then(|v| v.as_u64()),
                        candidate.get("score").and_then(|v| v.as_f64()),
                    ) {
                        writeln!(f, "    did you mean line {line} (similarity {score:.2})?")?;
                    }
                }
            }
        }

        writeln!(
            f,
            "\n{} file(s) applied, {} modification(s) failed{}",
            self.applied.len(),
            self.failed.len(),
            if self.force { " (force mode)" } else { "" }
        )?;

        if let Some(path) = &self.failure_report_path {
            writeln!(f, "failed modifications written to {}", path.display())?;
        }

        Ok(())
    }
}

fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.lines().map(|l| format!("{pad}{l}")).collect::<Vec<_>>().join("\n")
}
