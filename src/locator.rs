//! Resolves an (optional anchor, snippet[, end_snippet]) locator against a
//! working buffer to a unique byte range, or a taxonomy error describing why
//! it couldn't.

use crate::error::{ApError, ErrorCode};
use crate::fuzzy::fuzzy_matches;
use crate::matcher::smart_find;

const PREVIEW_LINES: usize = 7;

fn stripped_lines(s: &str) -> Vec<&str> {
    s.lines().map(str::trim).filter(|l| !l.is_empty()).collect()
}

fn preview(text: &str) -> String {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .take(PREVIEW_LINES)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Resolves the anchor against `buffer`, returning its unique `(start, end)`
/// range, or an error if it's absent or irresolvably ambiguous.
fn resolve_anchor(
    buffer: &str,
    anchor: &str,
    snippet: &str,
    cursor: usize,
) -> Result<(usize, usize), ApError> {
    let mut anchors = smart_find(buffer, anchor);
    if anchors.is_empty() {
        return Err(ApError::new(ErrorCode::AnchorNotFound, "anchor not found")
            .with_context("anchor", anchor));
    }

    if anchors.len() > 1 && cursor > 0 {
        let filtered: Vec<_> = anchors.iter().copied().filter(|&(s, _)| s >= cursor).collect();
        if !filtered.is_empty() {
            anchors = filtered;
        }
    }

    if anchors.len() > 1 {
        let all_snippet_hits = smart_find(buffer, snippet);
        let mut valid_scopes = Vec::new();
        for &(a_start, a_end) in &anchors {
            let Some(&(snip_start, _)) = all_snippet_hits.iter().find(|&&(s, _)| s >= a_end) else {
                continue;
            };
            let shadowed = anchors
                .iter()
                .any(|&(b_start, _)| b_start != a_start && b_start > a_end && b_start < snip_start);
            if !shadowed {
                valid_scopes.push((a_start, a_end));
            }
        }
        if valid_scopes.len() == 1 {
            anchors = valid_scopes;
        }
    }

    if anchors.len() > 1 {
        return Err(
            ApError::new(ErrorCode::AmbiguousAnchor, "anchor matches multiple locations")
                .with_context("anchor", anchor)
                .with_context("count", anchors.len() as u64),
        );
    }

    Ok(anchors[0])
}

/// Decides whether the snippet search space begins at the anchor's start or
/// its end, based on whether the snippet overlaps the anchor's own text.
fn search_space_start(buffer: &str, anchor_range: (usize, usize), snippet: &str) -> usize {
    let anchor_text = &buffer[anchor_range.0..anchor_range.1];
    let anchor_lines = stripped_lines(anchor_text);
    let snippet_lines = stripped_lines(snippet);

    let starts_with_anchor = !anchor_lines.is_empty()
        && snippet_lines.len() >= anchor_lines.len()
        && snippet_lines[..anchor_lines.len()] == anchor_lines[..];
    let first_line_equals_anchor_last = match (snippet_lines.first(), anchor_lines.last()) {
        (Some(s), Some(a)) => s == a,
        _ => false,
    };

    if starts_with_anchor || first_line_equals_anchor_last {
        anchor_range.0
    } else {
        anchor_range.1
    }
}

/// Locates `snippet` (optionally scoped by `anchor`) within `buffer`,
/// returning its absolute byte range.
pub fn locate_snippet(
    buffer: &str,
    anchor: Option<&str>,
    snippet: &str,
    cursor: usize,
) -> Result<(usize, usize), ApError> {
    let (search_space, offset, anchor_found): (&str, usize, Option<bool>) = match anchor {
        Some(anchor_text) => {
            let anchor_range = resolve_anchor(buffer, anchor_text, snippet, cursor)?;
            let start = search_space_start(buffer, anchor_range, snippet);
            (&buffer[start..], start, Some(true))
        }
        None => (buffer, 0, None),
    };

    let mut occurrences = smart_find(search_space, snippet);

    if occurrences.len() > 1 && cursor > 0 {
        if let Some(pos) = occurrences
            .iter()
            .position(|&(s, _)| s + offset >= cursor)
        {
            occurrences = vec![occurrences[pos]];
        }
    }

    if occurrences.is_empty() {
        let mut err = ApError::new(ErrorCode::SnippetNotFound, "snippet not found")
            .with_context("snippet", snippet)
            .with_context("fuzzy_matches", serde_json::to_value(fuzzy_matches(search_space, snippet)).unwrap_or_default())
            .with_context("search_space_preview", preview(search_space));
        if let Some(anchor_text) = anchor {
            err = err.with_context("anchor", anchor_text);
        }
        if let Some(found) = anchor_found {
            err = err.with_context("anchor_found", found);
        }
        return Err(err);
    }

    if occurrences.len() > 1 {
        if anchor.is_none() {
            return Err(
                ApError::new(ErrorCode::AmbiguousMatch, "snippet matches multiple locations")
                    .with_context("snippet", snippet)
                    .with_context("count", occurrences.len() as u64),
            );
        }
        // An anchor already scoped the search; assume the first match within
        // that scope is the intended one.
    }

    let (s, e) = occurrences[0];
    Ok((s + offset, e + offset))
}

/// Locates an end-snippet after `after`, the absolute end of a prior match.
pub fn locate_end_snippet(buffer: &str, after: usize, end_snippet: &str) -> Result<usize, ApError> {
    let tail = &buffer[after..];
    let occurrences = smart_find(tail, end_snippet);
    match occurrences.first() {
        Some(&(_, end)) => Ok(after + end),
        None => Err(
            ApError::new(ErrorCode::EndSnippetNotFound, "end_snippet not found after snippet")
                .with_context("end_snippet", end_snippet),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locates_unique_snippet() {
        let buf = "alpha\nbeta\ngamma\n";
        let (s, e) = locate_snippet(buf, None, "beta", 0).unwrap();
        assert_eq!(&buf[s..e], "beta\n");
    }

    #[test]
    fn ambiguous_without_anchor_fails() {
        let buf = "x=1\nx=1\n";
        let err = locate_snippet(buf, None, "x=1", 0).unwrap_err();
        assert_eq!(err.code, ErrorCode::AmbiguousMatch);
    }

    #[test]
    fn anchor_disambiguates() {
        let buf = "def a():\n  x=1\ndef b():\n  x=1\n";
        let (s, e) = locate_snippet(buf, Some("def b():"), "x=1", 0).unwrap();
        assert_eq!(&buf[s..e], "  x=1\n");
        assert!(s > buf.find("def b():").unwrap());
    }

    #[test]
    fn missing_anchor_fails() {
        let buf = "alpha\n";
        let err = locate_snippet(buf, Some("nope"), "alpha", 0).unwrap_err();
        assert_eq!(err.code, ErrorCode::AnchorNotFound);
    }

    #[test]
    fn missing_snippet_reports_fuzzy_suggestions() {
        let buf = "println!(\"Hello, wrold!\");\n";
        let err = locate_snippet(buf, None, "println!(\"Hello, world!\");", 0).unwrap_err();
        assert_eq!(err.code, ErrorCode::SnippetNotFound);
        assert!(err.context.contains_key("fuzzy_matches"));
    }

    #[test]
    fn range_locator_finds_end_snippet() {
        let buf = "# START\nold1\nold2\n# END\n";
        let (_, e1) = locate_snippet(buf, None, "# START", 0).unwrap();
        let end = locate_end_snippet(buf, e1, "# END").unwrap();
        assert_eq!(&buf[..end], "# START\nold1\nold2\n# END\n");
    }

    #[test]
    fn cursor_prefers_forward_occurrence() {
        let buf = "x=1\nfoo\nx=1\n";
        let cursor = buf.find("foo").unwrap();
        let (s, _) = locate_snippet(buf, None, "x=1", cursor).unwrap();
        assert!(s >= cursor);
    }
}
