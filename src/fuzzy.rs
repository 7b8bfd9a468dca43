//! Fuzzy suggestion ranker used only to *advise* on a failed snippet lookup,
//! never to locate a match. Scores candidate windows with the `similar`
//! crate's line-diff ratio and keeps the best few above a similarity floor.

use serde::Serialize;
use similar::TextDiff;

const MIN_SCORE: f64 = 0.7;
const MAX_SUGGESTIONS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuzzyMatch {
    pub line_number: usize,
    pub score: f64,
    pub text: String,
}

/// Slides a window the size of `snippet`'s stripped non-blank line count
/// across `content`'s non-blank lines, scoring each window against the
/// snippet with a Ratcliff/Obershelp-style ratio, and returns up to three
/// windows scoring at least 0.7, best first.
pub fn fuzzy_matches(content: &str, snippet: &str) -> Vec<FuzzyMatch> {
    let snippet_lines: Vec<&str> = snippet
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if snippet_lines.is_empty() {
        return Vec::new();
    }
    let window_len = snippet_lines.len();
    let snippet_joined = snippet_lines.join("\n");

    let non_blank: Vec<(usize, &str)> = content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| (i + 1, l))
        .collect();
    if non_blank.len() < window_len {
        return Vec::new();
    }

    let mut candidates = Vec::new();
    for start in 0..=(non_blank.len() - window_len) {
        let window = &non_blank[start..start + window_len];
        let window_joined = window
            .iter()
            .map(|(_, l)| l.trim())
            .collect::<Vec<_>>()
            .join("\n");
        let ratio = TextDiff::from_lines(window_joined.as_str(), snippet_joined.as_str()).ratio() as f64;
        if ratio >= MIN_SCORE {
            let text = window.iter().map(|(_, l)| *l).collect::<Vec<_>>().join("\n");
            candidates.push(FuzzyMatch {
                line_number: window[0].0,
                score: (ratio * 100.0).round() / 100.0,
                text,
            });
        }
    }

    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
    candidates.truncate(MAX_SUGGESTIONS);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_close_matches() {
        let content = "fn main() {\n    println!(\"Hello, wrold!\");\n}\n";
        let hits = fuzzy_matches(content, "println!(\"Hello, world!\");");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].line_number, 2);
    }

    #[test]
    fn no_suggestions_below_threshold() {
        let content = "totally unrelated content here\n";
        assert!(fuzzy_matches(content, "println!(\"Hello, world!\");").is_empty());
    }

    #[test]
    fn caps_at_three_suggestions() {
        let content = "foo bar\n".repeat(10);
        let hits = fuzzy_matches(&content, "foo baz");
        assert!(hits.len() <= 3);
    }

    #[test]
    fn empty_snippet_yields_nothing() {
        assert!(fuzzy_matches("a\nb\n", "").is_empty());
    }
}
