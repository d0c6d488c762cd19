//! Error and diagnostic types for the compiler core.
//!
//! Mirrors the five error kinds named in the specification's error-handling design: malformed
//! configuration and fatal errors abort the run (`Err(MarkupError)`); unsafe-operation, structural,
//! and soft errors are recorded as [`Diagnostic`]s on the running [`crate::document::Document`] and
//! do not by themselves stop translation.

use std::fmt;
use std::rc::Rc;

/// Position attribution for a diagnostic: the file, 1-based line number, and raw line text that was
/// being processed when the diagnostic was raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub file: Rc<str>,
    pub line: usize,
    pub text: String,
}

impl Cursor {
    pub fn new(file: impl Into<Rc<str>>, line: usize, text: impl Into<String>) -> Self {
        Cursor {
            file: file.into(),
            line,
            text: text.into(),
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:", self.file, self.line)
    }
}

/// The severity a diagnostic carries. Only `Error` affects the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A single recorded problem, attributed to a cursor when one is known.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub cursor: Option<Cursor>,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(cursor: Option<Cursor>, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            cursor,
            message: message.into(),
        }
    }

    pub fn error(cursor: Option<Cursor>, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            cursor,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        match &self.cursor {
            Some(c) => write!(f, "{} {}: {}", c, label, self.message),
            None => write!(f, "{}: {}", label, self.message),
        }
    }
}

/// Fatal failures that abort the run entirely. Soft errors, structural errors, and unsafe-operation
/// errors are non-fatal and travel as [`Diagnostic`]s instead (see module docs).
#[derive(Debug, Clone)]
pub enum MarkupError {
    /// Malformed configuration discovered during the cascade load: bad regex, a block definition
    /// naming a template section that doesn't exist, an unknown subs name, a malformed tag, etc.
    Config(String),
    /// A condition that should abort translation outright: a missing `endif`, a delimited block with
    /// no closing delimiter, or an include that escapes the safe-mode root.
    Fatal(String),
    /// Wraps an underlying I/O failure (opening the input, a configuration file, or the output).
    Io(String),
}

impl fmt::Display for MarkupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkupError::Config(msg) => write!(f, "configuration error: {}", msg),
            MarkupError::Fatal(msg) => write!(f, "fatal: {}", msg),
            MarkupError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for MarkupError {}

impl From<std::io::Error> for MarkupError {
    fn from(err: std::io::Error) -> Self {
        MarkupError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MarkupError>;
