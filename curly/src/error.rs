use std::fmt;
use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label};
use thiserror::Error;

/// Compile errors with source location information.
///
/// Every error aborts the compilation it was raised in; there is no
/// partial output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// Malformed token-level input: unterminated tags, bad attribute text.
    #[error("syntax error: {message}")]
    Syntax { message: String, span: Range<usize> },

    /// The reference names something the presenter does not expose, or
    /// uses it in a shape the operation cannot accept.
    #[error("invalid component `{reference}`: {reason}")]
    InvalidComponent {
        reference: String,
        reason: String,
        span: Range<usize>,
    },

    #[error("invalid attribute `{attribute}` for component `{reference}`")]
    InvalidAttribute {
        reference: String,
        attribute: String,
        span: Range<usize>,
    },

    #[error("missing attribute `{attribute}` for component `{reference}`")]
    MissingAttribute {
        reference: String,
        attribute: String,
        span: Range<usize>,
    },

    #[error("block `{reference}` is never closed")]
    IncompleteBlock { reference: String, span: Range<usize> },

    /// `expected` is `None` when an end tag appears with no open block.
    #[error("{}", incorrect_ending_message(.expected, .found))]
    IncorrectEnding {
        expected: Option<String>,
        found: String,
        span: Range<usize>,
    },
}

fn incorrect_ending_message(expected: &Option<String>, found: &str) -> String {
    match expected {
        Some(expected) => format!("block `{}` closed by `{{{{/{}}}}}`", expected, found),
        None => format!("unexpected end of block `{{{{/{}}}}}`", found),
    }
}

/// The error taxonomy without payloads, for matching in tests and
/// conformance files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompileErrorKind {
    Syntax,
    InvalidComponent,
    InvalidAttribute,
    MissingAttribute,
    IncompleteBlock,
    IncorrectEnding,
}

impl CompileErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            CompileErrorKind::Syntax => "SyntaxError",
            CompileErrorKind::InvalidComponent => "InvalidComponent",
            CompileErrorKind::InvalidAttribute => "InvalidAttributeError",
            CompileErrorKind::MissingAttribute => "MissingAttributeError",
            CompileErrorKind::IncompleteBlock => "IncompleteBlockError",
            CompileErrorKind::IncorrectEnding => "IncorrectEndingError",
        }
    }

    /// Accepts the long names (`InvalidAttributeError`) as well as the
    /// variant names (`InvalidAttribute`).
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name.trim_end_matches("Error") {
            "Syntax" => CompileErrorKind::Syntax,
            "InvalidComponent" => CompileErrorKind::InvalidComponent,
            "InvalidAttribute" => CompileErrorKind::InvalidAttribute,
            "MissingAttribute" => CompileErrorKind::MissingAttribute,
            "IncompleteBlock" => CompileErrorKind::IncompleteBlock,
            "IncorrectEnding" => CompileErrorKind::IncorrectEnding,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl CompileError {
    pub fn syntax(message: impl Into<String>, span: Range<usize>) -> Self {
        CompileError::Syntax {
            message: message.into(),
            span,
        }
    }

    pub fn invalid_component(
        reference: impl Into<String>,
        reason: impl Into<String>,
        span: Range<usize>,
    ) -> Self {
        CompileError::InvalidComponent {
            reference: reference.into(),
            reason: reason.into(),
            span,
        }
    }

    pub fn kind(&self) -> CompileErrorKind {
        match self {
            CompileError::Syntax { .. } => CompileErrorKind::Syntax,
            CompileError::InvalidComponent { .. } => CompileErrorKind::InvalidComponent,
            CompileError::InvalidAttribute { .. } => CompileErrorKind::InvalidAttribute,
            CompileError::MissingAttribute { .. } => CompileErrorKind::MissingAttribute,
            CompileError::IncompleteBlock { .. } => CompileErrorKind::IncompleteBlock,
            CompileError::IncorrectEnding { .. } => CompileErrorKind::IncorrectEnding,
        }
    }

    pub fn span(&self) -> Range<usize> {
        match self {
            CompileError::Syntax { span, .. }
            | CompileError::InvalidComponent { span, .. }
            | CompileError::InvalidAttribute { span, .. }
            | CompileError::MissingAttribute { span, .. }
            | CompileError::IncompleteBlock { span, .. }
            | CompileError::IncorrectEnding { span, .. } => span.clone(),
        }
    }

    /// Convert to a codespan-reporting Diagnostic for display.
    pub fn to_diagnostic(&self, file_id: usize) -> Diagnostic<usize> {
        Diagnostic::error()
            .with_message(self.to_string())
            .with_labels(vec![Label::primary(file_id, self.span())])
            .with_notes(vec![format!("error kind: {}", self.kind())])
    }
}
