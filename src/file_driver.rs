//! Reads target files into normalized working buffers and commits the
//! mutated buffers back to disk, handling line-ending round-tripping,
//! path-traversal protection, and force-mode's `afailed.ap` bookkeeping.

use crate::error::{ApError, ErrorCode};
use crate::parser::{serialize_plan, FileChange, NewlineStyle, PatchPlan};
use log::trace;
use std::fs;
use std::path::{Path, PathBuf};

/// A file pulled in from disk (or not yet existing), normalized to `\n` line
/// endings for the mutator to work with.
pub struct LoadedFile {
    pub path: PathBuf,
    pub existed: bool,
    pub buffer: String,
    pub newline: NewlineStyle,
}

/// Detects the dominant line ending in the first kibibyte of `content`: the
/// style of the first newline encountered wins, `Lf` if none is found.
pub fn detect_newline(content: &str) -> NewlineStyle {
    let sample = &content[..content.len().min(1024)];
    let bytes = sample.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'\n' {
            if i > 0 && bytes[i - 1] == b'\r' {
                return NewlineStyle::Crlf;
            }
            return NewlineStyle::Lf;
        }
        if b == b'\r' {
            return if bytes.get(i + 1) == Some(&b'\n') {
                NewlineStyle::Crlf
            } else {
                NewlineStyle::Cr
            };
        }
    }
    NewlineStyle::Lf
}

fn normalize_to_lf(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

/// Resolves `relative_path` under `project_dir`, canonicalizing both sides so
/// a patch carrying a `..`-laden or symlink-escaping path is rejected rather
/// than silently writing outside the project.
fn resolve_safe_path(project_dir: &Path, relative_path: &Path) -> Result<PathBuf, ApError> {
    let target = project_dir.join(relative_path);

    let base = fs::canonicalize(project_dir).map_err(|e| {
        ApError::new(ErrorCode::InvalidFilePath, format!("cannot resolve project directory: {e}"))
            .with_context("path", project_dir.display().to_string())
    })?;

    let resolved = if target.exists() {
        fs::canonicalize(&target).map_err(|e| {
            ApError::new(ErrorCode::InvalidFilePath, format!("cannot resolve path: {e}"))
                .with_context("path", relative_path.display().to_string())
        })?
    } else {
        let parent = target.parent().unwrap_or(Path::new(""));
        fs::create_dir_all(parent).map_err(|e| {
            ApError::new(ErrorCode::FileWriteError, format!("cannot create parent directory: {e}"))
                .with_context("path", parent.display().to_string())
        })?;
        let canon_parent = fs::canonicalize(parent).map_err(|e| {
            ApError::new(ErrorCode::InvalidFilePath, format!("cannot resolve parent directory: {e}"))
                .with_context("path", parent.display().to_string())
        })?;
        canon_parent.join(target.file_name().unwrap_or_default())
    };

    if !resolved.starts_with(&base) {
        return Err(ApError::new(
            ErrorCode::InvalidFilePath,
            "resolved path escapes the project directory",
        )
        .with_context("path", relative_path.display().to_string()));
    }

    Ok(resolved)
}

/// Loads the file a `FileChange` targets, normalizing it to `\n` line
/// endings and recording its original style so [`commit`] can restore it.
pub fn load(project_dir: &Path, change: &FileChange) -> Result<LoadedFile, ApError> {
    let resolved = resolve_safe_path(project_dir, &change.file_path)?;

    if resolved.is_dir() {
        return Err(ApError::new(ErrorCode::InvalidFilePath, "target path is a directory, not a file")
            .with_context("path", change.file_path.display().to_string()));
    }

    if !resolved.exists() {
        let only_creates = change
            .modifications
            .first()
            .is_some_and(|m| m.action == Some(crate::parser::Action::CreateFile));
        if !only_creates {
            return Err(ApError::new(ErrorCode::FileNotFound, "target file does not exist")
                .with_context("path", change.file_path.display().to_string()));
        }
        return Ok(LoadedFile {
            path: resolved,
            existed: false,
            buffer: String::new(),
            newline: change.newline.unwrap_or(NewlineStyle::Lf),
        });
    }

    let raw = fs::read_to_string(&resolved).map_err(|e| {
        ApError::new(ErrorCode::FileWriteError, format!("cannot read file: {e}"))
            .with_context("path", change.file_path.display().to_string())
    })?;
    let newline = change.newline.unwrap_or_else(|| detect_newline(&raw));
    trace!("loaded {} ({} bytes, newline {:?})", resolved.display(), raw.len(), newline);

    Ok(LoadedFile {
        path: resolved,
        existed: true,
        buffer: normalize_to_lf(&raw),
        newline,
    })
}

/// Rstrips trailing whitespace from every line and rejoins with `newline`,
/// mirroring the trailing-whitespace invariant every mutation must uphold.
pub fn denormalize(buffer: &str, newline: NewlineStyle) -> String {
    let had_trailing_newline = buffer.ends_with('\n');
    let mut lines: Vec<String> = buffer.lines().map(|l| l.trim_end().to_string()).collect();
    if !had_trailing_newline {
        if let Some(last) = lines.last() {
            if last.is_empty() {
                lines.pop();
            }
        }
    }
    let mut out = lines.join(newline.as_str());
    if had_trailing_newline {
        out.push_str(newline.as_str());
    }
    out
}

/// Writes `content` to `loaded.path`, skipping the write entirely if the
/// denormalized bytes are identical to what's already on disk.
pub fn commit(loaded: &LoadedFile, content: &str) -> Result<bool, ApError> {
    let final_bytes = denormalize(content, loaded.newline);
    if loaded.existed {
        if let Ok(existing) = fs::read_to_string(&loaded.path) {
            if existing == final_bytes {
                return Ok(false);
            }
        }
    }
    if let Some(parent) = loaded.path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            ApError::new(ErrorCode::FileWriteError, format!("cannot create parent directory: {e}"))
                .with_context("path", parent.display().to_string())
        })?;
    }
    fs::write(&loaded.path, final_bytes).map_err(|e| {
        ApError::new(ErrorCode::FileWriteError, format!("cannot write file: {e}"))
            .with_context("path", loaded.path.display().to_string())
    })?;
    Ok(true)
}

/// Path the replayable failure patch for a given project directory is
/// written to.
pub fn afailed_path(project_dir: &Path) -> PathBuf {
    project_dir.join("afailed.ap")
}

/// Refuses to run force mode a second time over the same leftover
/// `afailed.ap` until it's been reviewed and removed.
pub fn check_afailed_absent(project_dir: &Path) -> Result<(), ApError> {
    let path = afailed_path(project_dir);
    if path.exists() {
        return Err(ApError::new(
            ErrorCode::AfailedExists,
            "afailed.ap from a previous force-mode run already exists",
        )
        .with_context("path", path.display().to_string()));
    }
    Ok(())
}

/// Serializes the failed portion of a patch plan to `afailed.ap` so it can
/// be handed straight back in as a follow-up patch.
pub fn write_afailed(project_dir: &Path, plan: &PatchPlan) -> Result<PathBuf, ApError> {
    let path = afailed_path(project_dir);
    let text = serialize_plan(plan);
    fs::write(&path, text).map_err(|e| {
        ApError::new(ErrorCode::FileWriteError, format!("cannot write afailed.ap: {e}"))
            .with_context("path", path.display().to_string())
    })?;
    Ok(path)
}

/// Dumps a standalone debug patch for a single failed modification, for
/// `--create-failure-case` callers building a minimal repro.
pub fn write_failure_case(project_dir: &Path, mod_idx: usize, plan: &PatchPlan) -> Result<PathBuf, ApError> {
    let path = project_dir.join(format!("afailed.{mod_idx}.log"));
    let text = serialize_plan(plan);
    fs::write(&path, text).map_err(|e| {
        ApError::new(ErrorCode::FileWriteError, format!("cannot write failure case: {e}"))
            .with_context("path", path.display().to_string())
    })?;
    Ok(path)
}
