use std::fmt;
use thiserror::Error;

/// Position of a problem in template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    /// Byte offset into the source.
    pub offset: usize,
    /// 1-based line number.
    pub line: usize,
    /// 1-based column, counted in characters.
    pub column: usize,
}

impl Location {
    /// Computes line and column for `offset` within `source`.
    pub fn locate(source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let before = &source[..offset];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = before[line_start..].chars().count() + 1;
        Location {
            offset,
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} (offset {})", self.line, self.column, self.offset)
    }
}

#[derive(Error, Debug)]
pub enum YaplError {
    #[error("Lex Error at {location}: {message}")]
    Lex { message: String, location: Location },
    #[error("Parse Error at {location}: {message}")]
    Parse { message: String, location: Location },
    #[error("Template Not Found: {0}")]
    TemplateNotFound(String),
    #[error("max template depth exceeded (possible recursion): {0}")]
    MaxDepthExceeded(String),
    #[error("Security Error: path escapes base directory: {0}")]
    PathEscape(String),
    #[error("Resolution Error: {0}")]
    Resolution(String),
    #[error("Runtime Error: {0}")]
    Runtime(String),
    #[error("Serialization Error: {0}")]
    Serialization(String),
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
}

impl YaplError {
    pub(crate) fn lex(source: &str, offset: usize, message: impl Into<String>) -> Self {
        YaplError::Lex {
            message: message.into(),
            location: Location::locate(source, offset),
        }
    }

    pub(crate) fn parse(source: &str, offset: usize, message: impl Into<String>) -> Self {
        YaplError::Parse {
            message: message.into(),
            location: Location::locate(source, offset),
        }
    }

    /// True for strict-path violations, so callers can tell a hostile
    /// reference apart from a broken template.
    pub fn is_security(&self) -> bool {
        matches!(self, YaplError::PathEscape(_))
    }

    /// Where in the source a lexical or structural error was found.
    pub fn location(&self) -> Option<Location> {
        match self {
            YaplError::Lex { location, .. } | YaplError::Parse { location, .. } => Some(*location),
            _ => None,
        }
    }
}

impl serde::ser::Error for YaplError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        YaplError::Serialization(msg.to_string())
    }
}
