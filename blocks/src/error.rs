use std::fmt;
use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};

pub type Result<T, E = CssBlocksError> = std::result::Result<T, E>;

/// A position in a block source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub filename: String,
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
    /// Byte offset into the source text.
    pub offset: usize,
}

impl SourceLocation {
    pub fn span(&self) -> Range<usize> {
        self.offset..self.offset + 1
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.filename, self.line, self.column)
    }
}

/// Errors raised while loading, parsing or compiling blocks.
///
/// Errors are `Clone` because a failed load is cached and handed to every
/// caller that shares it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CssBlocksError {
    /// A block was compiled without the path of the file it came from.
    #[error(
        "the source file path is required to compile a block; pass the file the source was read from"
    )]
    MissingSourcePath,

    /// Grammar or legality violation in a block file.
    #[error("Invalid block syntax: {message}{}", at(.location))]
    InvalidBlockSyntax {
        message: String,
        location: Option<SourceLocation>,
    },

    /// Misuse of the block model: duplicate names, unresolvable
    /// references, unimplemented interfaces.
    #[error("{message}{}", at(.location))]
    Block {
        message: String,
        location: Option<SourceLocation>,
    },

    /// The importer could not produce a file.
    #[error("I/O error: {message}")]
    Io { message: String },
}

fn at(location: &Option<SourceLocation>) -> String {
    match location {
        Some(location) => format!(" ({})", location),
        None => String::new(),
    }
}

impl CssBlocksError {
    pub fn syntax(message: impl Into<String>, location: SourceLocation) -> Self {
        CssBlocksError::InvalidBlockSyntax {
            message: message.into(),
            location: Some(location),
        }
    }

    pub fn block(message: impl Into<String>) -> Self {
        CssBlocksError::Block {
            message: message.into(),
            location: None,
        }
    }

    pub fn block_at(message: impl Into<String>, location: SourceLocation) -> Self {
        CssBlocksError::Block {
            message: message.into(),
            location: Some(location),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        CssBlocksError::Io {
            message: message.into(),
        }
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            CssBlocksError::InvalidBlockSyntax { location, .. }
            | CssBlocksError::Block { location, .. } => location.as_ref(),
            CssBlocksError::MissingSourcePath | CssBlocksError::Io { .. } => None,
        }
    }

    /// The error text without the location suffix.
    pub fn message(&self) -> String {
        match self {
            CssBlocksError::InvalidBlockSyntax { message, .. }
            | CssBlocksError::Block { message, .. }
            | CssBlocksError::Io { message } => message.clone(),
            CssBlocksError::MissingSourcePath => self.to_string(),
        }
    }

    /// Convert to a codespan-reporting Diagnostic for display.
    pub fn to_diagnostic(&self, file_id: usize) -> Diagnostic<usize> {
        let diagnostic = Diagnostic::new(Severity::Error).with_message(self.message());
        match self.location() {
            Some(location) => {
                diagnostic.with_labels(vec![Label::primary(file_id, location.span())])
            }
            None => diagnostic,
        }
    }
}
