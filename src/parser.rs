//! Tokeniser for the AP 3.0 patch format.
//!
//! The format is deliberately boring: every structural line is marked by a
//! per-patch 8-hex-digit id followed by a space (the "directive prefix"), so
//! that literal content lines are never mistaken for directives even if they
//! happen to start with a keyword like `FILE` or `content`.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The three line-ending styles the format understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewlineStyle {
    Lf,
    Crlf,
    Cr,
}

impl NewlineStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            NewlineStyle::Lf => "\n",
            NewlineStyle::Crlf => "\r\n",
            NewlineStyle::Cr => "\r",
        }
    }

    fn parse_keyword(s: &str) -> Option<Self> {
        match s {
            "LF" => Some(NewlineStyle::Lf),
            "CRLF" => Some(NewlineStyle::Crlf),
            "CR" => Some(NewlineStyle::Cr),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Replace,
    InsertAfter,
    InsertBefore,
    Delete,
    CreateFile,
}

impl Action {
    fn keyword(self) -> &'static str {
        match self {
            Action::Replace => "REPLACE",
            Action::InsertAfter => "INSERT_AFTER",
            Action::InsertBefore => "INSERT_BEFORE",
            Action::Delete => "DELETE",
            Action::CreateFile => "CREATE_FILE",
        }
    }
}

/// A single edit within a file. Field presence is validated against `action`
/// just before it is located/applied, not at parse time (see `ApError::InvalidModification`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Modification {
    pub anchor: Option<String>,
    pub snippet: Option<String>,
    pub end_snippet: Option<String>,
    pub content: Option<String>,
    pub include_leading_blank_lines: usize,
    pub include_trailing_blank_lines: usize,
    pub action: Option<Action>,
}

impl Modification {
    fn new(action: Action) -> Self {
        Self {
            action: Some(action),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub file_path: PathBuf,
    pub newline: Option<NewlineStyle>,
    pub modifications: Vec<Modification>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchPlan {
    pub patch_id: String,
    pub changes: Vec<FileChange>,
}

/// All parser-level failures map to `ErrorCode::InvalidPatchFile`; the
/// variants exist purely to give `Display` a precise, line-numbered message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("patch file has no AP 3.0 header")]
    MissingHeader,
    #[error("line {line}: malformed header {line_text:?}, expected '<8-hex-digit-id> AP 3.0'")]
    BadHeader { line: usize, line_text: String },
    #[error("line {line}: unknown directive '{keyword}'")]
    UnknownDirective { line: usize, keyword: String },
    #[error("line {line}: directive '{directive}' does not take an argument")]
    UnexpectedArgument { line: usize, directive: String },
    #[error("line {line}: directive '{directive}' requires an integer argument")]
    IntegerArgMissing { line: usize, directive: String },
    #[error("line {line}: directive '{directive}' argument {value:?} is not a non-negative integer")]
    IntegerArgInvalid {
        line: usize,
        directive: String,
        value: String,
    },
    #[error("line {line}: value key '{key}' used outside any modification")]
    ValueKeyOutsideModification { line: usize, key: String },
    #[error("line {line}: action '{action}' appeared before any FILE directive")]
    ActionBeforeFile { line: usize, action: String },
    #[error("line {line}: a FILE directive is missing its path")]
    MissingFilePath { line: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenValue {
    FilePath,
    Anchor,
    Snippet,
    EndSnippet,
    Content,
}

impl fmt::Display for OpenValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpenValue::FilePath => "path",
            OpenValue::Anchor => "anchor",
            OpenValue::Snippet => "snippet",
            OpenValue::EndSnippet => "end_snippet",
            OpenValue::Content => "content",
        };
        f.write_str(s)
    }
}

struct FileBuilder {
    newline: Option<NewlineStyle>,
    file_path: Option<String>,
    modifications: Vec<Modification>,
}

struct Parser<'a> {
    prefix: String,
    current_file: Option<FileBuilder>,
    current_mod: Option<Modification>,
    open_value: Option<OpenValue>,
    open_lines: Vec<&'a str>,
    changes: Vec<FileChange>,
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn trim_blank_block(lines: &[&str]) -> String {
    let start = lines.iter().position(|l| !is_blank(l)).unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|l| !is_blank(l))
        .map(|i| i + 1)
        .unwrap_or(0);
    if start < end {
        lines[start..end].join("\n")
    } else {
        String::new()
    }
}

impl<'a> Parser<'a> {
    fn new(patch_id: String) -> Self {
        Self {
            prefix: format!("{} ", patch_id),
            current_file: None,
            current_mod: None,
            open_value: None,
            open_lines: Vec::new(),
            changes: Vec::new(),
        }
    }

    fn flush_value(&mut self, line: usize) -> Result<(), ParseError> {
        let Some(target) = self.open_value.take() else {
            self.open_lines.clear();
            return Ok(());
        };
        let value = trim_blank_block(&self.open_lines);
        self.open_lines.clear();
        match target {
            OpenValue::FilePath => {
                let file = self
                    .current_file
                    .as_mut()
                    .ok_or(ParseError::MissingFilePath { line })?;
                file.file_path = Some(value);
            }
            OpenValue::Anchor => {
                if let Some(m) = self.current_mod.as_mut() {
                    m.anchor = Some(value);
                }
            }
            OpenValue::Snippet => {
                if let Some(m) = self.current_mod.as_mut() {
                    m.snippet = Some(value);
                }
            }
            OpenValue::EndSnippet => {
                if let Some(m) = self.current_mod.as_mut() {
                    m.end_snippet = Some(value);
                }
            }
            OpenValue::Content => {
                if let Some(m) = self.current_mod.as_mut() {
                    m.content = Some(value);
                }
            }
        }
        Ok(())
    }

    fn finalize_mod(&mut self) {
        if let Some(m) = self.current_mod.take() {
            if let Some(file) = self.current_file.as_mut() {
                file.modifications.push(m);
            }
        }
    }

    fn finalize_file(&mut self, line: usize) -> Result<(), ParseError> {
        self.flush_value(line)?;
        self.finalize_mod();
        if let Some(file) = self.current_file.take() {
            let path = file.file_path.ok_or(ParseError::MissingFilePath { line })?;
            self.changes.push(FileChange {
                file_path: PathBuf::from(path),
                newline: file.newline,
                modifications: file.modifications,
            });
        }
        Ok(())
    }

    fn dispatch(&mut self, line_no: usize, text: &str) -> Result<(), ParseError> {
        self.flush_value(line_no)?;

        let mut parts = text.splitn(2, ' ');
        let keyword = parts.next().unwrap_or("");
        let rest = parts.next().map(str::trim).unwrap_or("");

        match keyword {
            "FILE" => {
                self.finalize_file(line_no)?;
                let newline = Self::parse_optional_newline(line_no, "FILE", rest)?;
                self.current_file = Some(FileBuilder {
                    newline,
                    file_path: None,
                    modifications: Vec::new(),
                });
                self.open_value = Some(OpenValue::FilePath);
            }
            "CREATE_FILE" => {
                self.finalize_file(line_no)?;
                let newline = Self::parse_optional_newline(line_no, "CREATE_FILE", rest)?;
                self.current_file = Some(FileBuilder {
                    newline,
                    file_path: None,
                    modifications: Vec::new(),
                });
                self.current_mod = Some(Modification::new(Action::CreateFile));
                self.open_value = Some(OpenValue::FilePath);
            }
            "REPLACE" | "INSERT_AFTER" | "INSERT_BEFORE" | "DELETE" => {
                if self.current_file.is_none() {
                    return Err(ParseError::ActionBeforeFile {
                        line: line_no,
                        action: keyword.to_string(),
                    });
                }
                if !rest.is_empty() {
                    return Err(ParseError::UnexpectedArgument {
                        line: line_no,
                        directive: keyword.to_string(),
                    });
                }
                self.finalize_mod();
                let action = match keyword {
                    "REPLACE" => Action::Replace,
                    "INSERT_AFTER" => Action::InsertAfter,
                    "INSERT_BEFORE" => Action::InsertBefore,
                    "DELETE" => Action::Delete,
                    _ => unreachable!(),
                };
                self.current_mod = Some(Modification::new(action));
            }
            "path" => {
                if self.current_file.is_none() {
                    return Err(ParseError::ValueKeyOutsideModification {
                        line: line_no,
                        key: "path".to_string(),
                    });
                }
                self.open_value = Some(OpenValue::FilePath);
            }
            "snippet" | "anchor" | "content" | "end_snippet" => {
                if self.current_mod.is_none() {
                    return Err(ParseError::ValueKeyOutsideModification {
                        line: line_no,
                        key: keyword.to_string(),
                    });
                }
                self.open_value = Some(match keyword {
                    "snippet" => OpenValue::Snippet,
                    "anchor" => OpenValue::Anchor,
                    "content" => OpenValue::Content,
                    "end_snippet" => OpenValue::EndSnippet,
                    _ => unreachable!(),
                });
            }
            "include_leading_blank_lines" | "include_trailing_blank_lines" => {
                if self.current_mod.is_none() {
                    return Err(ParseError::ValueKeyOutsideModification {
                        line: line_no,
                        key: keyword.to_string(),
                    });
                }
                if rest.is_empty() {
                    return Err(ParseError::IntegerArgMissing {
                        line: line_no,
                        directive: keyword.to_string(),
                    });
                }
                let n: usize = rest.parse().map_err(|_| ParseError::IntegerArgInvalid {
                    line: line_no,
                    directive: keyword.to_string(),
                    value: rest.to_string(),
                })?;
                let m = self.current_mod.as_mut().unwrap();
                if keyword == "include_leading_blank_lines" {
                    m.include_leading_blank_lines = n;
                } else {
                    m.include_trailing_blank_lines = n;
                }
            }
            "LF" | "CRLF" | "CR" => {
                if self.current_file.is_none() {
                    return Err(ParseError::ActionBeforeFile {
                        line: line_no,
                        action: keyword.to_string(),
                    });
                }
                if !rest.is_empty() {
                    return Err(ParseError::UnexpectedArgument {
                        line: line_no,
                        directive: keyword.to_string(),
                    });
                }
                self.current_file.as_mut().unwrap().newline = NewlineStyle::parse_keyword(keyword);
            }
            _ => {
                return Err(ParseError::UnknownDirective {
                    line: line_no,
                    keyword: keyword.to_string(),
                })
            }
        }
        Ok(())
    }

    fn parse_optional_newline(
        line: usize,
        directive: &str,
        rest: &str,
    ) -> Result<Option<NewlineStyle>, ParseError> {
        if rest.is_empty() {
            return Ok(None);
        }
        NewlineStyle::parse_keyword(rest)
            .map(Some)
            .ok_or_else(|| ParseError::UnexpectedArgument {
                line,
                directive: directive.to_string(),
            })
    }

    fn content_line(&mut self, _line_no: usize, line: &'a str) {
        if self.open_value.is_some() {
            self.open_lines.push(line);
        }
        // Stray content lines with no open value slot are silently dropped;
        // they carry no information the plan needs.
    }
}

/// Parses the body of an AP 3.0 patch file into a [`PatchPlan`].
pub fn parse_patch(content: &str) -> Result<PatchPlan, ParseError> {
    let mut lines = content.lines().enumerate();
    let mut header_line_no = 0;
    let mut patch_id = None;

    for (idx, line) in lines.by_ref() {
        let line_no = idx + 1;
        if is_blank(line) || line.trim_start().starts_with('#') {
            continue;
        }
        let trimmed = line.trim();
        let mut parts = trimmed.splitn(2, ' ');
        let id_candidate = parts.next().unwrap_or("");
        let remainder = parts.next().unwrap_or("");
        let valid_id = id_candidate.len() == 8
            && id_candidate
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid_id && remainder == "AP 3.0" {
            patch_id = Some(id_candidate.to_string());
            header_line_no = line_no;
            break;
        }
        return Err(ParseError::BadHeader {
            line: line_no,
            line_text: line.to_string(),
        });
    }

    let patch_id = patch_id.ok_or(ParseError::MissingHeader)?;
    let mut parser = Parser::new(patch_id.clone());

    for (idx, line) in lines {
        let line_no = idx + 1;
        if let Some(directive) = line.strip_prefix(parser.prefix.as_str()) {
            parser.dispatch(line_no, directive)?;
        } else {
            parser.content_line(line_no, line);
        }
    }

    parser.finalize_file(header_line_no)?;

    Ok(PatchPlan {
        patch_id,
        changes: parser.changes,
    })
}

fn action_keyword(action: Action) -> &'static str {
    action.keyword()
}

/// Serialises a [`PatchPlan`] back into AP 3.0 text, used to emit `afailed.ap`
/// force-mode replay files. Round-trips with [`parse_patch`]: every value was
/// already trimmed when the plan was built, so re-parsing the serialised form
/// yields byte-for-byte the same plan.
pub fn serialize_plan(plan: &PatchPlan) -> String {
    let prefix = format!("{} ", plan.patch_id);
    let mut out = String::new();
    out.push_str(&plan.patch_id);
    out.push_str(" AP 3.0\n");

    let emit_value = |out: &mut String, key: &str, value: &str| {
        out.push_str(&prefix);
        out.push_str(key);
        out.push('\n');
        if !value.is_empty() {
            out.push_str(value);
            out.push('\n');
        }
    };
    let newline_suffix = |n: Option<NewlineStyle>| match n {
        Some(NewlineStyle::Lf) => " LF",
        Some(NewlineStyle::Crlf) => " CRLF",
        Some(NewlineStyle::Cr) => " CR",
        None => "",
    };

    for change in &plan.changes {
        let path_str = change.file_path.to_string_lossy().into_owned();
        if change.modifications.len() == 1 && change.modifications[0].action == Some(Action::CreateFile)
        {
            let m = &change.modifications[0];
            out.push_str(&prefix);
            out.push_str("CREATE_FILE");
            out.push_str(newline_suffix(change.newline));
            out.push('\n');
            emit_value(&mut out, "path", &path_str);
            if let Some(content) = &m.content {
                emit_value(&mut out, "content", content);
            }
            continue;
        }

        out.push_str(&prefix);
        out.push_str("FILE");
        out.push_str(newline_suffix(change.newline));
        out.push('\n');
        emit_value(&mut out, "path", &path_str);

        for m in &change.modifications {
            let Some(action) = m.action else { continue };
            out.push_str(&prefix);
            out.push_str(action_keyword(action));
            out.push('\n');
            if let Some(a) = &m.anchor {
                emit_value(&mut out, "anchor", a);
            }
            if let Some(s) = &m.snippet {
                emit_value(&mut out, "snippet", s);
            }
            if let Some(e) = &m.end_snippet {
                emit_value(&mut out, "end_snippet", e);
            }
            if let Some(c) = &m.content {
                emit_value(&mut out, "content", c);
            }
            if m.include_leading_blank_lines > 0 {
                out.push_str(&format!(
                    "{}include_leading_blank_lines {}\n",
                    prefix, m.include_leading_blank_lines
                ));
            }
            if m.include_trailing_blank_lines > 0 {
                out.push_str(&format!(
                    "{}include_trailing_blank_lines {}\n",
                    prefix, m.include_trailing_blank_lines
                ));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_replace() {
        let patch = "\
deadbeef AP 3.0
deadbeef FILE
a.txt
deadbeef REPLACE
deadbeef snippet
beta
deadbeef content
BETA
";
        let plan = parse_patch(patch).unwrap();
        assert_eq!(plan.patch_id, "deadbeef");
        assert_eq!(plan.changes.len(), 1);
        let change = &plan.changes[0];
        assert_eq!(change.file_path, PathBuf::from("a.txt"));
        assert_eq!(change.modifications.len(), 1);
        let m = &change.modifications[0];
        assert_eq!(m.action, Some(Action::Replace));
        assert_eq!(m.snippet.as_deref(), Some("beta"));
        assert_eq!(m.content.as_deref(), Some("BETA"));
    }

    #[test]
    fn rejects_bad_header() {
        let err = parse_patch("not a header\n").unwrap_err();
        assert!(matches!(err, ParseError::BadHeader { .. }));
    }

    #[test]
    fn rejects_action_before_file() {
        let patch = "deadbeef AP 3.0\ndeadbeef REPLACE\n";
        let err = parse_patch(patch).unwrap_err();
        assert!(matches!(err, ParseError::ActionBeforeFile { .. }));
    }

    #[test]
    fn skips_comments_and_blank_lines_before_header() {
        let patch = "# a comment\n\ndeadbeef AP 3.0\ndeadbeef FILE\na.txt\ndeadbeef DELETE\ndeadbeef snippet\nx\n";
        let plan = parse_patch(patch).unwrap();
        assert_eq!(plan.changes.len(), 1);
    }

    #[test]
    fn create_file_is_hybrid() {
        let patch = "deadbeef AP 3.0\ndeadbeef CREATE_FILE\nnew.txt\ndeadbeef content\nhello\n";
        let plan = parse_patch(patch).unwrap();
        assert_eq!(plan.changes.len(), 1);
        let change = &plan.changes[0];
        assert_eq!(change.file_path, PathBuf::from("new.txt"));
        assert_eq!(change.modifications.len(), 1);
        assert_eq!(change.modifications[0].action, Some(Action::CreateFile));
        assert_eq!(change.modifications[0].content.as_deref(), Some("hello"));
    }

    #[test]
    fn trims_blank_lines_around_value_but_keeps_internal_blanks() {
        let patch = "deadbeef AP 3.0\ndeadbeef FILE\na.txt\ndeadbeef REPLACE\ndeadbeef snippet\nx\ndeadbeef content\n\n\nfirst\n\nsecond\n\n\n";
        let plan = parse_patch(patch).unwrap();
        let m = &plan.changes[0].modifications[0];
        assert_eq!(m.content.as_deref(), Some("first\n\nsecond"));
    }

    #[test]
    fn roundtrips_through_serialize() {
        let patch = "deadbeef AP 3.0\ndeadbeef FILE CRLF\na.txt\ndeadbeef REPLACE\ndeadbeef anchor\ndef b():\ndeadbeef snippet\nx=1\ndeadbeef content\nx=2\ndeadbeef include_leading_blank_lines 1\n";
        let plan = parse_patch(patch).unwrap();
        let serialized = serialize_plan(&plan);
        let reparsed = parse_patch(&serialized).unwrap();
        assert_eq!(plan, reparsed);
    }

    #[test]
    fn unknown_directive_is_rejected() {
        let patch = "deadbeef AP 3.0\ndeadbeef FILE\na.txt\ndeadbeef BOGUS\n";
        let err = parse_patch(patch).unwrap_err();
        assert!(matches!(err, ParseError::UnknownDirective { .. }));
    }

    #[test]
    fn integer_arg_must_be_an_integer() {
        let patch = "deadbeef AP 3.0\ndeadbeef FILE\na.txt\ndeadbeef REPLACE\ndeadbeef snippet\nx\ndeadbeef include_leading_blank_lines abc\n";
        let err = parse_patch(patch).unwrap_err();
        assert!(matches!(err, ParseError::IntegerArgInvalid { .. }));
    }
}
