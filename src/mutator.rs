//! Applies a parsed [`Modification`] to a file's in-memory working buffer.
//!
//! This is the only stage that mutates text. It never decides *where* to
//! act — that's the locator's job — it only decides *what string ends up in
//! the buffer* once a range has been found, including the idempotency gates
//! that make re-applying the same patch a no-op.

use crate::error::{ApError, ErrorCode};
use crate::locator::{locate_end_snippet, locate_snippet};
use crate::matcher::{line_spans, stripped_lines};
use crate::parser::{Action, Modification};

/// Outcome of applying one modification to a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModOutcome {
    /// The buffer changed.
    Applied,
    /// The requested state was already present; the buffer is untouched.
    Skipped,
}

/// Reduces a string to the newline-joined form used for idempotency
/// comparisons: blank lines dropped, remaining lines stripped, joined by a
/// single `\n`. Two snippets are "the same" for gating purposes iff their
/// normal forms match.
pub fn normalize_compare(s: &str) -> String {
    stripped_lines(s).join("\n")
}

/// The contiguous run of space/tab characters starting at `start`, i.e. the
/// indentation prefix of the line `start` begins on (`start` is always a
/// content line's own start, per the locator's invariant, so the leading
/// whitespace of that line sits immediately *after* `start`, not before it).
///
/// Exposed for testing only: per the format's own (documented) quirk,
/// emitted content is spliced verbatim and is never re-indented using this
/// value.
pub fn compute_indentation(buffer: &str, start: usize) -> String {
    let bytes = buffer.as_bytes();
    let mut i = start;
    while i < buffer.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
        i += 1;
    }
    buffer[start..i].to_string()
}

fn is_blank_line(buffer: &str, span: crate::matcher::LineSpan) -> bool {
    buffer[span.start..span.end].trim().is_empty()
}

/// Walks `start` backward and `end` forward across up to `leading`/`trailing`
/// wholly-blank lines, widening the range that will be replaced/deleted so a
/// `REPLACE`/`DELETE` can also absorb the blank lines that used to surround
/// its target.
pub fn expand_range(
    buffer: &str,
    start: usize,
    end: usize,
    leading: usize,
    trailing: usize,
) -> (usize, usize) {
    let spans = line_spans(buffer);
    let mut start_idx = spans.iter().position(|s| s.start == start).unwrap_or(0);
    let mut end_idx = spans
        .iter()
        .position(|s| s.start == end)
        .unwrap_or(spans.len());

    for _ in 0..leading {
        if start_idx == 0 {
            break;
        }
        let candidate = start_idx - 1;
        if is_blank_line(buffer, spans[candidate]) {
            start_idx = candidate;
        } else {
            break;
        }
    }

    for _ in 0..trailing {
        if end_idx >= spans.len() || !is_blank_line(buffer, spans[end_idx]) {
            break;
        }
        end_idx += 1;
    }

    let new_start = spans.get(start_idx).map(|s| s.start).unwrap_or(start);
    let new_end = spans.get(end_idx).map(|s| s.start).unwrap_or(buffer.len());
    (new_start, new_end)
}

/// Drops a redundant `end_snippet` so the range locator is only invoked when
/// it actually disambiguates something: an `end_snippet` identical to
/// `content` (a common LLM habit of repeating the closing content as the end
/// marker) or one that's already a suffix of `snippet` carries no additional
/// information over a plain snippet locate.
fn effective_end_snippet<'a>(end_snippet: Option<&'a str>, snippet: &str, content: &str) -> Option<&'a str> {
    let end_snippet = end_snippet?;
    if normalize_compare(end_snippet) == normalize_compare(content) {
        return None;
    }
    let snippet_lines = stripped_lines(snippet);
    let end_lines = stripped_lines(end_snippet);
    if !end_lines.is_empty()
        && snippet_lines.len() >= end_lines.len()
        && snippet_lines[snippet_lines.len() - end_lines.len()..] == end_lines[..]
    {
        return None;
    }
    Some(end_snippet)
}

fn validate(action: Action, m: &Modification) -> Result<(), ApError> {
    match action {
        Action::CreateFile => Ok(()),
        Action::Replace | Action::InsertAfter | Action::InsertBefore | Action::Delete => {
            if m.snippet.as_deref().map(str::trim).unwrap_or("").is_empty() {
                return Err(ApError::new(
                    ErrorCode::InvalidModification,
                    format!("{:?} requires a non-empty snippet", action),
                ));
            }
            if matches!(action, Action::InsertAfter | Action::InsertBefore) && m.end_snippet.is_some() {
                return Err(ApError::new(
                    ErrorCode::InvalidModification,
                    "end_snippet is only valid on REPLACE and DELETE",
                ));
            }
            Ok(())
        }
    }
}

/// Splices `content` into `buffer` at `[start, end)` per `action`'s
/// semantics, preserving the trailing-newline discipline of whatever it
/// replaces: an inserted/replacing block gains a trailing `\n` if the text it
/// sits next to had one, so a file never silently loses its final newline.
fn splice(buffer: &mut String, action: Action, start: usize, end: usize, content: &str) {
    match action {
        Action::Delete => {
            buffer.replace_range(start..end, "");
        }
        Action::Replace => {
            let mut new_text = content.to_string();
            if buffer[start..end].ends_with('\n') && !new_text.is_empty() && !new_text.ends_with('\n') {
                new_text.push('\n');
            }
            buffer.replace_range(start..end, &new_text);
        }
        Action::InsertAfter => {
            let mut new_text = content.to_string();
            if !new_text.is_empty() && !new_text.ends_with('\n') {
                new_text.push('\n');
            }
            buffer.replace_range(end..end, &new_text);
        }
        Action::InsertBefore => {
            let mut new_text = content.to_string();
            if !new_text.is_empty() && !new_text.ends_with('\n') {
                new_text.push('\n');
            }
            buffer.replace_range(start..start, &new_text);
        }
        Action::CreateFile => unreachable!("CREATE_FILE is handled before any range is located"),
    }
}

fn apply_create_file(buffer: &mut String, file_existed: bool, content: &str) -> Result<ModOutcome, ApError> {
    if !file_existed {
        *buffer = content.to_string();
        return Ok(ModOutcome::Applied);
    }
    if normalize_compare(buffer) == normalize_compare(content) {
        return Ok(ModOutcome::Skipped);
    }
    if buffer.trim().is_empty() {
        *buffer = content.to_string();
        return Ok(ModOutcome::Applied);
    }
    Err(ApError::new(
        ErrorCode::FileExists,
        "CREATE_FILE target already exists with different content",
    ))
}

/// Applies every modification of one `FileChange` to `buffer` in order,
/// never stopping early: a failure at modification `i` is recorded and the
/// loop continues to `i + 1` so callers running in force mode can still
/// salvage whatever modifications *did* locate cleanly. Non-force callers
/// are expected to discard `buffer` entirely if any entry in the returned
/// vector is `Err`.
pub fn apply_file_change(
    buffer: &mut String,
    file_existed: bool,
    modifications: &[Modification],
) -> Vec<Result<ModOutcome, ApError>> {
    let mut cursor = 0usize;
    let mut results = Vec::with_capacity(modifications.len());

    for m in modifications {
        let Some(action) = m.action else {
            results.push(Err(ApError::new(
                ErrorCode::InvalidModification,
                "modification has no action",
            )));
            continue;
        };

        if action == Action::CreateFile {
            let content = m.content.as_deref().unwrap_or("");
            results.push(apply_create_file(buffer, file_existed, content));
            continue;
        }

        if let Err(e) = validate(action, m) {
            results.push(Err(e));
            continue;
        }

        let snippet = m.snippet.as_deref().unwrap_or("");
        let anchor = m.anchor.as_deref();
        let content = m.content.as_deref().unwrap_or("");
        let end_snippet = effective_end_snippet(m.end_snippet.as_deref(), snippet, content);

        let located = locate_snippet(buffer, anchor, snippet, cursor).and_then(|(s, e)| match end_snippet {
            Some(es) => locate_end_snippet(buffer, e, es).map(|e2| (s, e2)),
            None => Ok((s, e)),
        });

        let range = match located {
            Ok(r) => r,
            Err(err)
                if err.code == ErrorCode::SnippetNotFound
                    && matches!(action, Action::Delete | Action::Replace)
                    && locate_snippet(buffer, anchor, content, cursor).is_ok() =>
            {
                // The snippet is gone but the replacement/deleted content is
                // already there: this modification was already applied.
                results.push(Ok(ModOutcome::Skipped));
                continue;
            }
            Err(err) => {
                results.push(Err(err));
                continue;
            }
        };

        let (start, end) = expand_range(
            buffer,
            range.0,
            range.1,
            m.include_leading_blank_lines,
            m.include_trailing_blank_lines,
        );

        let normalized_content = normalize_compare(content);
        let already_satisfied = match action {
            Action::Replace => normalize_compare(&buffer[start..end]) == normalized_content,
            Action::InsertAfter => normalize_compare(&buffer[end..]).starts_with(normalized_content.as_str()),
            Action::InsertBefore => normalize_compare(&buffer[..start]).ends_with(normalized_content.as_str()),
            Action::Delete | Action::CreateFile => false,
        };
        if already_satisfied {
            cursor = start;
            results.push(Ok(ModOutcome::Skipped));
            continue;
        }

        splice(buffer, action, start, end, content);
        cursor = start;
        results.push(Ok(ModOutcome::Applied));
    }

    results
}
