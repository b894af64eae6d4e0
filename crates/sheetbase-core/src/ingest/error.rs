//! Error types and SNAFU context selectors for the ingestion pipeline.

use snafu::prelude::*;

use crate::{
    catalog::{CatalogError, TableId},
    error::ErrorKind,
    manager::catalog_error_kind,
    storage::StorageError,
};

/// Errors from building row batches and appending them to a table.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum IngestError {
    /// The table does not exist or has been soft-deleted.
    #[snafu(display("Table {id} not found"))]
    NotFound {
        /// The identifier that was looked up.
        id: TableId,
    },

    /// The incoming column order differs from the table's recorded columns.
    #[snafu(display(
        "Column list does not match table '{table}': expected {expected:?}, got {actual:?}"
    ))]
    SchemaMismatch {
        /// Logical name of the target table.
        table: String,
        /// Columns recorded in the catalog.
        expected: Vec<String>,
        /// Columns found in the incoming data.
        actual: Vec<String>,
    },

    /// A grid row is wider or narrower than its header.
    #[snafu(display("Row {row} has {found} values but the header has {expected} columns"))]
    RaggedRow {
        /// One-based data row number.
        row: usize,
        /// Header width.
        expected: usize,
        /// Values found in the row.
        found: usize,
    },

    /// A record carries different keys (or key order) than the first record.
    #[snafu(display("Record {record} has keys {actual:?}; expected {expected:?}"))]
    RecordKeys {
        /// One-based record number.
        record: usize,
        /// Keys of the first record.
        expected: Vec<String>,
        /// Keys of this record.
        actual: Vec<String>,
    },

    /// A value exceeds the per-column length bound.
    #[snafu(display(
        "Value in row {row}, column '{column}' has {len} characters; at most {max} are allowed"
    ))]
    ValueTooLong {
        /// One-based data row number.
        row: usize,
        /// Column of the value.
        column: String,
        /// Length of the value in characters.
        len: usize,
        /// The bound.
        max: usize,
    },

    /// Manual-entry payload is not valid JSON.
    #[snafu(display("Invalid JSON records: {source}"))]
    InvalidJson {
        /// Underlying parse error.
        source: serde_json::Error,
    },

    /// Manual-entry payload is valid JSON but not an array of objects.
    #[snafu(display("Expected a JSON array of objects; {message}"))]
    NotRecords {
        /// What was found instead.
        message: String,
    },

    /// A file in a multi-file batch failed.
    #[snafu(display("File {file}: {source}"))]
    InFile {
        /// Name of the failing file.
        file: String,
        /// The failure.
        #[snafu(source(from(IngestError, Box::new)))]
        source: Box<IngestError>,
    },

    /// Catalog read failure.
    #[snafu(display("Catalog error during ingestion: {source}"))]
    Catalog {
        /// Underlying catalog error.
        #[snafu(source(from(CatalogError, Box::new)))]
        source: Box<CatalogError>,
    },

    /// Insert or session failure in the storage engine.
    #[snafu(display("Storage error during ingestion: {source}"))]
    Storage {
        /// Underlying storage error.
        #[snafu(backtrace)]
        source: StorageError,
    },
}

impl IngestError {
    /// Coarse classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::NotFound { .. } => ErrorKind::NotFound,
            IngestError::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            IngestError::RaggedRow { .. }
            | IngestError::RecordKeys { .. }
            | IngestError::ValueTooLong { .. }
            | IngestError::InvalidJson { .. }
            | IngestError::NotRecords { .. } => ErrorKind::InvalidInput,
            IngestError::InFile { source, .. } => source.kind(),
            IngestError::Catalog { source } => catalog_error_kind(source),
            IngestError::Storage { .. } => ErrorKind::Storage,
        }
    }
}

impl From<CatalogError> for IngestError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound { id } => IngestError::NotFound { id },
            other => IngestError::Catalog {
                source: Box::new(other),
            },
        }
    }
}
