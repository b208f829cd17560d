use std::fmt;

use crate::RecordKey;

/// Category of a table error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Backend misconfigured (bad path, bad page size).
    Config,
    /// Backend unreachable or I/O failed.
    Io,
    /// Stored data could not be decoded.
    Format,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
            ErrorKind::Format => "format",
        })
    }
}

/// Error returned by every `RecordTable` method.
///
/// `key` is set when the failure concerns one record, e.g. a delete that
/// could not be persisted.
#[derive(Debug)]
pub struct TableError {
    pub kind: ErrorKind,
    pub message: String,
    pub key: Option<RecordKey>,
}

impl TableError {
    fn new(kind: ErrorKind, message: String) -> Self {
        Self { kind, message, key: None }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Format, msg.into())
    }

    /// Prefix the message: `"{ctx}: {message}"`. Kind and key are kept.
    pub fn with_context(mut self, ctx: impl fmt::Display) -> Self {
        self.message = format!("{ctx}: {}", self.message);
        self
    }

    /// Attach the record the failure concerns.
    pub fn at(mut self, key: RecordKey) -> Self {
        self.key = Some(key);
        self
    }
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{} error at {key}: {}", self.kind, self.message),
            None => write!(f, "{} error: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for TableError {}

impl From<std::io::Error> for TableError {
    fn from(e: std::io::Error) -> Self {
        Self::io(e.to_string())
    }
}

impl From<serde_json::Error> for TableError {
    fn from(e: serde_json::Error) -> Self {
        Self::format(e.to_string())
    }
}
