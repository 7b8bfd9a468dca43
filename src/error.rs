//! The error taxonomy shared by every stage of the pipeline.
//!
//! Unlike a typical Rust library, most of the codes below never surface as a
//! Rust-level `Err`: they are folded into a [`Report::Failed`](crate::report::Report)
//! so that `apply_patch` always returns a structured result instead of
//! raising.

use serde::Serialize;
use std::fmt;

/// Stable, machine-readable error codes. The `Serialize` impl renders these
/// exactly as the taxonomy names so JSON reports are stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidPatchFile,
    InvalidModification,
    InvalidFilePath,
    FileNotFound,
    FileExists,
    AnchorNotFound,
    AmbiguousAnchor,
    SnippetNotFound,
    EndSnippetNotFound,
    AmbiguousMatch,
    FileWriteError,
    AfailedExists,
    AllChangesFailed,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::InvalidPatchFile => "INVALID_PATCH_FILE",
            ErrorCode::InvalidModification => "INVALID_MODIFICATION",
            ErrorCode::InvalidFilePath => "INVALID_FILE_PATH",
            ErrorCode::FileNotFound => "FILE_NOT_FOUND",
            ErrorCode::FileExists => "FILE_EXISTS",
            ErrorCode::AnchorNotFound => "ANCHOR_NOT_FOUND",
            ErrorCode::AmbiguousAnchor => "AMBIGUOUS_ANCHOR",
            ErrorCode::SnippetNotFound => "SNIPPET_NOT_FOUND",
            ErrorCode::EndSnippetNotFound => "END_SNIPPET_NOT_FOUND",
            ErrorCode::AmbiguousMatch => "AMBIGUOUS_MATCH",
            ErrorCode::FileWriteError => "FILE_WRITE_ERROR",
            ErrorCode::AfailedExists => "AFAILED_EXISTS",
            ErrorCode::AllChangesFailed => "ALL_CHANGES_FAILED",
        };
        f.write_str(s)
    }
}

/// A single recoverable failure, carrying enough context to render a useful
/// report without the caller having to re-derive it from the locator state.
///
/// `context` is a loose JSON bag rather than a fixed struct: the fields that
/// make sense (`anchor`, `snippet`, `fuzzy_matches`, `search_space_preview`, ...)
/// vary by `code`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty", default)]
    pub context: serde_json::Map<String, serde_json::Value>,
}

impl ApError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: serde_json::Map::new(),
        }
    }

    pub fn with_context(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }
}

impl fmt::Display for ApError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApError {}
