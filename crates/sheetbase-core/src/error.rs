//! Error classification shared by every layer.
//!
//! Each layer keeps its own SNAFU error enum with layer-specific context.
//! [`ErrorKind`] is the coarse, machine-readable classification those enums
//! map onto, so front ends can branch on the kind of failure while still
//! printing the detailed message.

use std::fmt;

/// Coarse classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The requested table definition is malformed (bad name or column list).
    InvalidSchema,
    /// A logical or display name is already taken.
    DuplicateName,
    /// The referenced table does not exist (or is soft-deleted).
    NotFound,
    /// Uploaded columns do not match the table's recorded columns.
    SchemaMismatch,
    /// The uploaded file is not in the accepted spreadsheet format.
    UnsupportedFormat,
    /// The payload is well-formed for its format but not acceptable
    /// (ragged rows, over-long values, unknown projected columns).
    InvalidInput,
    /// Connection, DDL or DML failure in the storage engine.
    Storage,
}

impl ErrorKind {
    /// Stable lowercase label, suitable for logs and machine consumers.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidSchema => "invalid_schema",
            ErrorKind::DuplicateName => "duplicate_name",
            ErrorKind::NotFound => "not_found",
            ErrorKind::SchemaMismatch => "schema_mismatch",
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Storage => "storage",
        }
    }

    /// Whether the failure was caused by the caller's request rather than
    /// by the storage engine.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ErrorKind::Storage)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
