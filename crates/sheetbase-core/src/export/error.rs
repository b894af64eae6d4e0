use arrow::error::ArrowError;
use snafu::prelude::*;

use crate::{
    catalog::{CatalogError, TableId},
    error::ErrorKind,
    manager::catalog_error_kind,
    spreadsheet::SpreadsheetError,
    storage::StorageError,
};

/// Errors from reading tables back out and serializing them.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ExportError {
    /// The table does not exist or has been soft-deleted.
    #[snafu(display("Table {id} not found"))]
    NotFound {
        /// The identifier that was looked up.
        id: TableId,
    },

    /// A projected column is not part of the table.
    #[snafu(display("Table '{table}' has no column '{column}'"))]
    UnknownColumn {
        /// Logical name of the table.
        table: String,
        /// The requested column.
        column: String,
    },

    /// An explicit projection named no columns.
    #[snafu(display("Projection must name at least one column"))]
    EmptyProjection,

    /// Catalog read failure.
    #[snafu(display("Catalog error during export: {source}"))]
    Catalog {
        /// Underlying catalog error.
        #[snafu(source(from(CatalogError, Box::new)))]
        source: Box<CatalogError>,
    },

    /// Query or session failure in the storage engine.
    #[snafu(display("Storage error during export: {source}"))]
    Storage {
        /// Underlying storage error.
        #[snafu(backtrace)]
        source: StorageError,
    },

    /// Building or serializing an Arrow batch failed.
    #[snafu(display("Arrow error during export: {source}"))]
    Arrow {
        /// Underlying Arrow error.
        source: ArrowError,
    },

    /// Writing the spreadsheet failed.
    #[snafu(display("{source}"))]
    Spreadsheet {
        /// Underlying codec error.
        source: SpreadsheetError,
    },
}

impl ExportError {
    /// Coarse classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExportError::NotFound { .. } => ErrorKind::NotFound,
            ExportError::UnknownColumn { .. } | ExportError::EmptyProjection => {
                ErrorKind::InvalidInput
            }
            ExportError::Catalog { source } => catalog_error_kind(source),
            ExportError::Spreadsheet { source } => source.kind(),
            ExportError::Storage { .. } | ExportError::Arrow { .. } => ErrorKind::Storage,
        }
    }
}

impl From<CatalogError> for ExportError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound { id } => ExportError::NotFound { id },
            other => ExportError::Catalog {
                source: Box::new(other),
            },
        }
    }
}
