use std::fmt;

use snafu::prelude::*;

use crate::{catalog::TableId, storage::StorageError};

/// Which unique name of a descriptor collided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameField {
    /// The logical (physical) table name.
    Logical,
    /// The display name.
    Display,
}

impl fmt::Display for NameField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameField::Logical => f.write_str("table name"),
            NameField::Display => f.write_str("display name"),
        }
    }
}

/// Errors from catalog reads and writes.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CatalogError {
    /// Another descriptor already holds the name.
    #[snafu(display("The {field} '{name}' is already taken"))]
    DuplicateName {
        /// Which name collided.
        field: NameField,
        /// The requested value.
        name: String,
    },

    /// No descriptor with this identifier exists.
    #[snafu(display("Table {id} not found"))]
    NotFound {
        /// The identifier that was looked up.
        id: TableId,
    },

    /// A stored descriptor row could not be decoded.
    #[snafu(display("Catalog entry {id} is corrupt: {message}"))]
    CorruptDescriptor {
        /// Raw identifier of the row.
        id: i64,
        /// What failed to decode.
        message: String,
    },

    /// Underlying storage failure.
    #[snafu(display("Catalog storage error: {source}"))]
    Storage {
        /// Storage error with operation context.
        #[snafu(backtrace)]
        source: StorageError,
    },
}
