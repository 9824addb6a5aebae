use std::{fmt, sync::Arc};

use thiserror::Error;

/// A position in a source unit. Lines and columns start at 1.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub file: Arc<str>,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(file: impl Into<Arc<str>>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Classification of a diagnostic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Lexer,
    Parser,
    Type,
    Runtime,
}

/// The specific failure behind a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    UnterminatedString,
    UnexpectedEndOfFile,
    UnexpectedEndOfCombo,
    UnbalancedCloser,
    MismatchedCloser,
    TrailingContent,

    EmptyForm,
    ArityMismatch,
    UnsupportedForm,
    MalformedForm,
    InvalidLiteral,
    UnresolvedType,
    UndefinedVariable,
    NoMatchingConstructor,
    NoMatchingIndexer,
    TooDeeplyNested,

    NoCommonBaseType,
    TypeMismatch,
    OperatorNotDefined,
    InvalidConversion,

    DivideByZero,
    Overflow,
    IndexOutOfRange,
    KeyNotFound,
    DuplicateKey,
    InvalidCast,
    NullReference,
    UnboundVariable,
    Host,
}

impl ErrorCode {
    pub fn kind(self) -> DiagnosticKind {
        use ErrorCode::*;
        match self {
            UnterminatedString | UnexpectedEndOfFile | UnexpectedEndOfCombo | UnbalancedCloser
            | MismatchedCloser | TrailingContent => DiagnosticKind::Lexer,
            EmptyForm | ArityMismatch | UnsupportedForm | MalformedForm | InvalidLiteral
            | UnresolvedType | UndefinedVariable | NoMatchingConstructor | NoMatchingIndexer
            | TooDeeplyNested => DiagnosticKind::Parser,
            NoCommonBaseType | TypeMismatch | OperatorNotDefined | InvalidConversion => {
                DiagnosticKind::Type
            }
            DivideByZero | Overflow | IndexOutOfRange | KeyNotFound | DuplicateKey
            | InvalidCast | NullReference | UnboundVariable | Host => DiagnosticKind::Runtime,
        }
    }
}

/// Rich diagnostic information surfaced to the embedding host.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub message: String,
    pub location: Option<Location>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            location: None,
            notes: Vec::new(),
        }
    }

    pub fn at(code: ErrorCode, message: impl Into<String>, location: &Location) -> Self {
        Self::new(code, message).with_location(location.clone())
    }

    pub fn kind(&self) -> DiagnosticKind {
        self.code.kind()
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} error ({:?}): {}", self.kind(), self.code, self.message)?;
        if let Some(location) = &self.location {
            write!(f, " at {location}")?;
        }
        for note in &self.notes {
            write!(f, "\n  note: {note}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

/// Unified error type for the Schwa toolchain.
#[derive(Debug, Error)]
pub enum SchwaError {
    #[error("{0}")]
    Diagnostic(#[from] Diagnostic),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SchwaError {
    /// The diagnostic code, if this error came from the language pipeline.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            SchwaError::Diagnostic(diagnostic) => Some(diagnostic.code),
            SchwaError::Io(_) => None,
        }
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            SchwaError::Diagnostic(diagnostic) => diagnostic.location.as_ref(),
            SchwaError::Io(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SchwaError>;
