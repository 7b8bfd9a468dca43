//! Whitespace- and blank-line-tolerant multi-line matching.
//!
//! `smart_find` is the one primitive every other stage of the locator builds
//! on: it never raises, it never picks a "best" match, it simply enumerates
//! every place a snippet's non-blank, stripped lines occur in the content.

/// A line's byte span within its owning string, with the trailing `\n`
/// folded into `end` (matching Python's `str.splitlines(keepends=True)`
/// semantics) so slicing up to `end` includes the line's own newline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSpan {
    pub start: usize,
    pub end: usize,
}

/// Splits `content` into line spans, each span's `end` including the line's
/// trailing newline byte (or extending to end-of-content for the final,
/// newline-less line). A trailing newline at end-of-content does not produce
/// a final empty span, matching `str::splitlines`.
pub fn line_spans(content: &str) -> Vec<LineSpan> {
    let mut spans = Vec::new();
    let bytes = content.as_bytes();
    let mut start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'\n' {
            spans.push(LineSpan { start, end: i + 1 });
            start = i + 1;
        }
    }
    if start < content.len() {
        spans.push(LineSpan {
            start,
            end: content.len(),
        });
    }
    spans
}

fn line_text(content: &str, span: LineSpan) -> &str {
    content[span.start..span.end].trim_end_matches('\n')
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// The snippet reduced to its stripped, non-blank lines — the normal form
/// every comparison in the locator and mutator operates on.
pub(crate) fn stripped_lines(s: &str) -> Vec<&str> {
    s.lines().map(str::trim).filter(|l| !l.is_empty()).collect()
}

/// Finds every occurrence of `snippet` in `content`, tolerant of indentation
/// drift and extra/missing blank lines.
///
/// The snippet is reduced to its stripped, non-blank lines. A candidate match
/// starts at a non-blank content line and consumes content's non-blank lines
/// one at a time (transparently skipping interleaved blank lines) until it
/// has gathered as many lines as the snippet has. The first gathered line
/// only needs to *end with* the snippet's first stripped line (tolerating a
/// dropped leading token/indent); every other gathered line must equal the
/// corresponding snippet line exactly after stripping.
///
/// Returns the matched byte ranges in order of the content line they start
/// on. An empty (or all-blank) snippet never matches anything.
pub fn smart_find(content: &str, snippet: &str) -> Vec<(usize, usize)> {
    let snippet_lines: Vec<&str> = snippet
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if snippet_lines.is_empty() {
        return Vec::new();
    }

    let spans = line_spans(content);
    let mut occurrences = Vec::new();

    for i in 0..spans.len() {
        if is_blank(line_text(content, spans[i])) {
            continue;
        }

        let mut consumed_idx = Vec::with_capacity(snippet_lines.len());
        let mut j = i;
        while consumed_idx.len() < snippet_lines.len() && j < spans.len() {
            if !is_blank(line_text(content, spans[j])) {
                consumed_idx.push(j);
            }
            j += 1;
        }
        if consumed_idx.len() != snippet_lines.len() {
            continue;
        }

        let first_text = line_text(content, spans[consumed_idx[0]]).trim();
        if !first_text.ends_with(snippet_lines[0]) {
            continue;
        }
        let rest_matches = consumed_idx[1..]
            .iter()
            .zip(&snippet_lines[1..])
            .all(|(&idx, expected)| line_text(content, spans[idx]).trim() == *expected);
        if !rest_matches {
            continue;
        }

        let start = spans[consumed_idx[0]].start;
        let end = spans[*consumed_idx.last().unwrap()].end;
        occurrences.push((start, end));
    }

    occurrences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_single_line_snippet() {
        let content = "alpha\nbeta\ngamma\n";
        assert_eq!(smart_find(content, "beta"), vec![(6, 11)]);
    }

    #[test]
    fn tolerates_indentation() {
        let content = "def f():\n    x = 1\n    y = 2\n";
        let hits = smart_find(content, "x = 1\ny = 2");
        assert_eq!(hits.len(), 1);
        let (s, e) = hits[0];
        assert_eq!(&content[s..e], "    x = 1\n    y = 2\n");
    }

    #[test]
    fn skips_interleaved_blank_lines() {
        let content = "a\n\nb\nc\n";
        let hits = smart_find(content, "a\nb\nc");
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn hybrid_head_allows_suffix_match_on_first_line_only() {
        let content = "    foo = bar\nbaz\n";
        let hits = smart_find(content, "foo = bar\nbaz");
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn non_first_lines_require_exact_stripped_equality() {
        let content = "foo = bar\n   extra baz\n";
        // second snippet line must equal exactly after stripping; "baz" != "extra baz"
        assert!(smart_find(content, "foo = bar\nbaz").is_empty());
    }

    #[test]
    fn finds_multiple_occurrences() {
        let content = "x=1\nx=1\n";
        assert_eq!(smart_find(content, "x=1").len(), 2);
    }

    #[test]
    fn empty_snippet_never_matches() {
        assert!(smart_find("a\nb\n", "").is_empty());
        assert!(smart_find("a\nb\n", "   \n\n").is_empty());
    }

    #[test]
    fn match_must_start_on_non_blank_line() {
        let content = "\na\n";
        let hits = smart_find(content, "a");
        assert_eq!(hits, vec![(1, 2)]);
    }
}
