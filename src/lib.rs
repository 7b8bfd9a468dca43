//! # appatch
//!
//! An AI-friendly patch engine: applies structured, snippet-located edits
//! that tolerate indentation and blank-line drift in LLM-authored patches.
//!
//! Unlike a line-numbered unified diff, an AP 3.0 patch locates each edit by
//! the surrounding source text itself (an optional `anchor` plus a
//! `snippet`), so a patch produced against a slightly different revision of
//! a file still applies cleanly as long as the referenced code hasn't moved.
//!
//! ```no_run
//! use appatch::{apply_patch, ApplyOptions};
//! use std::path::Path;
//!
//! let report = apply_patch(
//!     Path::new("change.ap"),
//!     Path::new("./my-project"),
//!     &ApplyOptions::default(),
//! );
//! if !report.is_success() {
//!     eprintln!("{report}");
//! }
//! ```

mod error;
mod file_driver;
mod fuzzy;
mod locator;
mod matcher;
mod mutator;
mod parser;
mod report;

pub use error::{ApError, ErrorCode};
pub use fuzzy::FuzzyMatch;
pub use matcher::{line_spans, smart_find, LineSpan};
pub use parser::{
    parse_patch, serialize_plan, Action, FileChange, Modification, NewlineStyle, ParseError, PatchPlan,
};
pub use report::{AppliedFile, FailedModification, Report};

use log::debug;
use mutator::ModOutcome;
use std::fs;
use std::path::{Path, PathBuf};

/// Knobs controlling how a patch is applied. `Default` matches the CLI's own
/// defaults: whole-patch atomicity, real writes, no debug artifacts.
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Compute everything but write nothing.
    pub dry_run: bool,
    /// Render the returned [`Report`] as JSON rather than human-readable text.
    /// `apply_patch` itself doesn't render anything, but callers building a
    /// CLI around it share this flag with their own output path so it lives
    /// on the same options struct as the rest of the run's configuration.
    pub json_report: bool,
    /// Emit extra `log::debug!` diagnostics while processing each file.
    pub debug: bool,
    /// Apply whatever modifications can be located, per file, instead of
    /// requiring the entire patch to succeed before writing anything.
    pub force: bool,
    /// Where to write the replayable failure patch. Defaults to
    /// `<project_dir>/afailed.ap` when `None`.
    pub failure_report_path: Option<PathBuf>,
    /// Also dump a standalone single-modification patch per failure, for
    /// building a minimal repro.
    pub create_failure_case: bool,
}

struct FileOutcome {
    loaded: Option<file_driver::LoadedFile>,
    working: String,
    mod_results: Vec<Result<ModOutcome, ApError>>,
    load_error: Option<ApError>,
}

fn process_file_change(project_dir: &Path, change: &FileChange, debug_enabled: bool) -> FileOutcome {
    if debug_enabled {
        debug!("processing {} ({} modification(s))", change.file_path.display(), change.modifications.len());
    }
    match file_driver::load(project_dir, change) {
        Ok(loaded) => {
            let mut working = loaded.buffer.clone();
            let mod_results = mutator::apply_file_change(&mut working, loaded.existed, &change.modifications);
            if debug_enabled {
                for (idx, result) in mod_results.iter().enumerate() {
                    debug!("  modification {idx} of {}: {:?}", change.file_path.display(), result);
                }
            }
            FileOutcome {
                loaded: Some(loaded),
                working,
                mod_results,
                load_error: None,
            }
        }
        Err(e) => {
            if debug_enabled {
                debug!("  failed to load {}: {e}", change.file_path.display());
            }
            FileOutcome {
                loaded: None,
                working: String::new(),
                mod_results: Vec::new(),
                load_error: Some(e),
            }
        }
    }
}

#[cfg(feature = "parallel")]
fn process_all(project_dir: &Path, changes: &[FileChange], debug_enabled: bool) -> Vec<FileOutcome> {
    use rayon::prelude::*;
    changes
        .par_iter()
        .map(|c| process_file_change(project_dir, c, debug_enabled))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn process_all(project_dir: &Path, changes: &[FileChange], debug_enabled: bool) -> Vec<FileOutcome> {
    changes
        .iter()
        .map(|c| process_file_change(project_dir, c, debug_enabled))
        .collect()
}

/// Builds the replayable failure plan: only the `FileChange`s that had at
/// least one failing modification, containing only those modifications.
fn build_afailed_plan(patch_id: &str, changes: &[FileChange], outcomes: &[FileOutcome]) -> Option<PatchPlan> {
    let mut failed_changes = Vec::new();
    for (change, outcome) in changes.iter().zip(outcomes) {
        if outcome.load_error.is_some() {
            failed_changes.push(change.clone());
            continue;
        }
        let failing: Vec<Modification> = change
            .modifications
            .iter()
            .zip(&outcome.mod_results)
            .filter(|(_, r)| r.is_err())
            .map(|(m, _)| m.clone())
            .collect();
        if !failing.is_empty() {
            failed_changes.push(FileChange {
                file_path: change.file_path.clone(),
                newline: change.newline,
                modifications: failing,
            });
        }
    }
    if failed_changes.is_empty() {
        None
    } else {
        Some(PatchPlan {
            patch_id: patch_id.to_string(),
            changes: failed_changes,
        })
    }
}

/// Applies every `FileChange` in `patch_file` to `project_dir`.
///
/// In the default (non-force) mode this is all-or-nothing across the whole
/// patch: every modification in every file is located and test-applied
/// against an in-memory copy first, and nothing is written to disk unless
/// all of them succeed. With `options.force`, each file is best-effort: a
/// modification that can't be located is recorded as a failure but doesn't
/// stop the rest of that file (or any other file) from being patched, and
/// the failures are collected into a replayable `afailed.ap`.
///
/// This function never returns `Err` — every outcome, including a
/// completely malformed patch file, is folded into the returned [`Report`].
pub fn apply_patch(patch_file: &Path, project_dir: &Path, options: &ApplyOptions) -> Report {
    let content = match fs::read_to_string(patch_file) {
        Ok(c) => c,
        Err(e) => {
            let mut report = Report::new("", options.dry_run, options.force);
            report.failed.push(FailedModification {
                file_path: patch_file.to_path_buf(),
                mod_index: 0,
                error: ApError::new(ErrorCode::InvalidPatchFile, format!("cannot read patch file: {e}")),
            });
            return report;
        }
    };

    let plan = match parse_patch(&content) {
        Ok(p) => p,
        Err(e) => {
            let mut report = Report::new("", options.dry_run, options.force);
            report.failed.push(FailedModification {
                file_path: patch_file.to_path_buf(),
                mod_index: 0,
                error: ApError::new(ErrorCode::InvalidPatchFile, e.to_string()),
            });
            return report;
        }
    };

    if options.force {
        if let Err(e) = file_driver::check_afailed_absent(project_dir) {
            let mut report = Report::new(plan.patch_id.clone(), options.dry_run, options.force);
            report.failed.push(FailedModification {
                file_path: project_dir.to_path_buf(),
                mod_index: 0,
                error: e,
            });
            return report;
        }
    }

    let outcomes = process_all(project_dir, &plan.changes, options.debug);

    let any_mod_failed = outcomes
        .iter()
        .any(|o| o.load_error.is_some() || o.mod_results.iter().any(Result::is_err));

    let mut report = Report::new(plan.patch_id.clone(), options.dry_run, options.force);

    if any_mod_failed && !options.force {
        for (change, outcome) in plan.changes.iter().zip(&outcomes) {
            if let Some(err) = &outcome.load_error {
                report.failed.push(FailedModification {
                    file_path: change.file_path.clone(),
                    mod_index: 0,
                    error: err.clone(),
                });
                continue;
            }
            for (idx, result) in outcome.mod_results.iter().enumerate() {
                if let Err(err) = result {
                    report.failed.push(FailedModification {
                        file_path: change.file_path.clone(),
                        mod_index: idx,
                        error: err.clone(),
                    });
                }
            }
        }
        return report;
    }

    // Either everything succeeded, or we're in force mode and commit
    // whatever did.
    for (change, outcome) in plan.changes.iter().zip(&outcomes) {
        if let Some(err) = &outcome.load_error {
            report.failed.push(FailedModification {
                file_path: change.file_path.clone(),
                mod_index: 0,
                error: err.clone(),
            });
            continue;
        }
        let loaded = outcome.loaded.as_ref().expect("loaded file present when load_error is None");

        let applied_count = outcome.mod_results.iter().filter(|r| matches!(r, Ok(ModOutcome::Applied))).count();
        let skipped_count = outcome.mod_results.iter().filter(|r| matches!(r, Ok(ModOutcome::Skipped))).count();
        for (idx, result) in outcome.mod_results.iter().enumerate() {
            if let Err(err) = result {
                report.failed.push(FailedModification {
                    file_path: change.file_path.clone(),
                    mod_index: idx,
                    error: err.clone(),
                });
            }
        }

        // A file whose every modification was idempotently skipped never
        // changed in memory, so it must never be written: `commit`'s own
        // byte-compare can't reliably catch this, since denormalization
        // (rstripping trailing whitespace) can make an untouched buffer
        // differ from the bytes already on disk.
        if !options.dry_run && applied_count > 0 {
            if let Err(e) = file_driver::commit(loaded, &outcome.working) {
                report.failed.push(FailedModification {
                    file_path: change.file_path.clone(),
                    mod_index: 0,
                    error: e,
                });
                continue;
            }
        }

        if applied_count > 0 || skipped_count > 0 {
            report.applied.push(AppliedFile {
                file_path: change.file_path.clone(),
                modifications_applied: applied_count,
                modifications_skipped: skipped_count,
            });
        }
    }

    if options.force && !report.failed.is_empty() {
        if report.applied.is_empty() {
            report.failed.push(FailedModification {
                file_path: project_dir.to_path_buf(),
                mod_index: 0,
                error: ApError::new(ErrorCode::AllChangesFailed, "no modification in the patch could be applied"),
            });
        }

        if !options.dry_run {
            if let Some(afailed_plan) = build_afailed_plan(&plan.patch_id, &plan.changes, &outcomes) {
                let write_result = match &options.failure_report_path {
                    Some(path) => fs::write(path, serialize_plan(&afailed_plan))
                        .map(|_| path.clone())
                        .map_err(|e| {
                            ApError::new(ErrorCode::FileWriteError, format!("cannot write failure report: {e}"))
                        }),
                    None => file_driver::write_afailed(project_dir, &afailed_plan),
                };
                match write_result {
                    Ok(path) => report.failure_report_path = Some(path),
                    Err(e) => report.failed.push(FailedModification {
                        file_path: project_dir.to_path_buf(),
                        mod_index: 0,
                        error: e,
                    }),
                }

                if options.create_failure_case {
                    for (idx, change) in afailed_plan.changes.iter().enumerate() {
                        let single = PatchPlan {
                            patch_id: afailed_plan.patch_id.clone(),
                            changes: vec![change.clone()],
                        };
                        let _ = file_driver::write_failure_case(project_dir, idx, &single);
                    }
                }
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use tempfile::tempdir;

    fn write_patch(dir: &Path, text: &str) -> PathBuf {
        let path = dir.join("change.ap");
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn applies_a_simple_replace_end_to_end() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.rs"), "fn main() {\n    println!(\"hi\");\n}\n").unwrap();

        let patch = indoc! {r#"
            a1b2c3d4 AP 3.0
            a1b2c3d4 FILE
            main.rs
            a1b2c3d4 REPLACE
            a1b2c3d4 snippet
            println!("hi");
            a1b2c3d4 content
            println!("hello");
        "#};
        let patch_path = write_patch(dir.path(), patch);

        let report = apply_patch(&patch_path, dir.path(), &ApplyOptions::default());
        assert!(report.is_success(), "{report:?}");
        let written = fs::read_to_string(dir.path().join("main.rs")).unwrap();
        assert_eq!(written, "fn main() {\n    println!(\"hello\");\n}\n");
    }

    #[test]
    fn non_force_mode_is_all_or_nothing_across_the_whole_patch() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "x = 1\n").unwrap();
        fs::write(dir.path().join("b.rs"), "y = 1\n").unwrap();

        let patch = indoc! {"
            deadbeef AP 3.0
            deadbeef FILE
            a.rs
            deadbeef REPLACE
            deadbeef snippet
            x = 1
            deadbeef content
            x = 2
            deadbeef FILE
            b.rs
            deadbeef REPLACE
            deadbeef snippet
            not-there
            deadbeef content
            y = 2
        "};
        let patch_path = write_patch(dir.path(), patch);

        let report = apply_patch(&patch_path, dir.path(), &ApplyOptions::default());
        assert!(!report.is_success());
        // a.rs must be untouched even though its own modification located fine.
        assert_eq!(fs::read_to_string(dir.path().join("a.rs")).unwrap(), "x = 1\n");
    }

    #[test]
    fn force_mode_applies_what_it_can_and_writes_afailed() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "x = 1\n").unwrap();
        fs::write(dir.path().join("b.rs"), "y = 1\n").unwrap();

        let patch = indoc! {"
            deadbeef AP 3.0
            deadbeef FILE
            a.rs
            deadbeef REPLACE
            deadbeef snippet
            x = 1
            deadbeef content
            x = 2
            deadbeef FILE
            b.rs
            deadbeef REPLACE
            deadbeef snippet
            not-there
            deadbeef content
            y = 2
        "};
        let patch_path = write_patch(dir.path(), patch);

        let options = ApplyOptions {
            force: true,
            ..Default::default()
        };
        let report = apply_patch(&patch_path, dir.path(), &options);
        assert!(!report.is_success());
        assert_eq!(fs::read_to_string(dir.path().join("a.rs")).unwrap(), "x = 2\n");
        assert!(report.failure_report_path.is_some());
        assert!(dir.path().join("afailed.ap").exists());
    }

    #[test]
    fn force_mode_refuses_to_run_over_a_stale_afailed() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("afailed.ap"), "deadbeef AP 3.0\n").unwrap();
        let patch_path = write_patch(
            dir.path(),
            indoc! {"
                deadbeef AP 3.0
                deadbeef FILE
            a.rs
                deadbeef REPLACE
                deadbeef snippet
                x
                deadbeef content
                y
            "},
        );
        let options = ApplyOptions {
            force: true,
            ..Default::default()
        };
        let report = apply_patch(&patch_path, dir.path(), &options);
        assert!(!report.is_success());
        assert_eq!(report.failed[0].error.code, ErrorCode::AfailedExists);
    }

    #[test]
    fn create_file_writes_a_brand_new_file() {
        let dir = tempdir().unwrap();
        let patch_path = write_patch(
            dir.path(),
            indoc! {"
                deadbeef AP 3.0
                deadbeef FILE
                new_mod.rs
                deadbeef CREATE_FILE
                deadbeef content
                pub fn hi() {}
            "},
        );
        let report = apply_patch(&patch_path, dir.path(), &ApplyOptions::default());
        assert!(report.is_success(), "{report:?}");
        assert_eq!(
            fs::read_to_string(dir.path().join("new_mod.rs")).unwrap(),
            "pub fn hi() {}\n"
        );
    }

    #[test]
    fn malformed_patch_file_yields_a_failed_report_not_a_panic() {
        let dir = tempdir().unwrap();
        let patch_path = write_patch(dir.path(), "not a valid patch\n");
        let report = apply_patch(&patch_path, dir.path(), &ApplyOptions::default());
        assert!(!report.is_success());
        assert_eq!(report.failed[0].error.code, ErrorCode::InvalidPatchFile);
    }

    #[test]
    fn dry_run_never_touches_the_filesystem() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "x = 1\n").unwrap();
        let patch_path = write_patch(
            dir.path(),
            indoc! {"
                deadbeef AP 3.0
                deadbeef FILE
            a.rs
                deadbeef REPLACE
                deadbeef snippet
                x = 1
                deadbeef content
                x = 2
            "},
        );
        let options = ApplyOptions {
            dry_run: true,
            ..Default::default()
        };
        let report = apply_patch(&patch_path, dir.path(), &options);
        assert!(report.is_success());
        assert_eq!(fs::read_to_string(dir.path().join("a.rs")).unwrap(), "x = 1\n");
    }
}
