//! Typed schema builder for dynamic tables.
//!
//! A [`TableSpec`] is what a caller asks for; [`TableSpec::validate`] turns it
//! into a [`ValidatedSpec`] or a [`SchemaError`]. Only validated specs reach
//! the table manager, so malformed names never produce DDL.

use std::collections::HashSet;

use snafu::prelude::*;

use crate::catalog::{CATALOG_RELATION, OwnerId};

/// Name of the implicit, auto-assigned row identifier column.
pub const ROW_ID_COLUMN: &str = "id";

/// Longest accepted logical name, display name or column name (in characters).
pub const MAX_NAME_LEN: usize = 64;

/// Most user columns a single table may declare.
pub const MAX_COLUMNS: usize = 512;

const RESERVED_TABLE_PREFIX: &str = "sqlite_";

/// Errors raised when a requested table definition is malformed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SchemaError {
    /// The logical name is empty or whitespace.
    #[snafu(display("Table name must not be empty"))]
    EmptyTableName,

    /// The display name is empty or whitespace.
    #[snafu(display("Display name must not be empty"))]
    EmptyDisplayName,

    /// A name exceeds [`MAX_NAME_LEN`].
    #[snafu(display("{what} '{name}' is longer than {max} characters"))]
    NameTooLong {
        /// Which name was too long (`table name`, `display name`, `column name`).
        what: String,
        /// The offending name.
        name: String,
        /// The limit.
        max: usize,
    },

    /// The logical name collides with a name the storage engine or the
    /// catalog reserves.
    #[snafu(display("Table name '{name}' is reserved"))]
    ReservedTableName {
        /// The reserved name.
        name: String,
    },

    /// No columns were requested.
    #[snafu(display("Column list must not be empty"))]
    EmptyColumnList,

    /// More than [`MAX_COLUMNS`] columns were requested.
    #[snafu(display("Column list has {count} columns; at most {max} are allowed"))]
    TooManyColumns {
        /// Number of requested columns.
        count: usize,
        /// The limit.
        max: usize,
    },

    /// A column name is empty or whitespace.
    #[snafu(display("Column name at position {position} must not be empty"))]
    EmptyColumnName {
        /// Zero-based position within the requested column list.
        position: usize,
    },

    /// A column name appears more than once.
    #[snafu(display("Duplicate column name: {column}"))]
    DuplicateColumn {
        /// The duplicated name.
        column: String,
    },

    /// A column uses the name of the implicit row identifier.
    #[snafu(display("Column name '{column}' is reserved for the row identifier"))]
    ReservedColumn {
        /// The reserved name.
        column: String,
    },
}

/// A requested table definition, not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    logical_name: String,
    display_name: Option<String>,
    owner: OwnerId,
    columns: Vec<String>,
}

/// A table definition that passed [`TableSpec::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSpec {
    logical_name: String,
    display_name: String,
    owner: OwnerId,
    columns: Vec<String>,
}

impl TableSpec {
    /// Request a table named `logical_name` with the given ordered columns.
    pub fn new<I, S>(logical_name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            logical_name: logical_name.into(),
            display_name: None,
            owner: OwnerId::ROOT,
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Set a display name (defaults to the logical name).
    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Set the owning principal (defaults to [`OwnerId::ROOT`]).
    pub fn owner(mut self, owner: OwnerId) -> Self {
        self.owner = owner;
        self
    }

    /// The requested logical name.
    pub fn logical_name(&self) -> &str {
        &self.logical_name
    }

    /// Check every naming rule and freeze the definition.
    pub fn validate(self) -> Result<ValidatedSpec, SchemaError> {
        if self.logical_name.trim().is_empty() {
            return EmptyTableNameSnafu.fail();
        }
        ensure_name_len("table name", &self.logical_name)?;
        if self.logical_name.to_lowercase().starts_with(RESERVED_TABLE_PREFIX)
            || self.logical_name.eq_ignore_ascii_case(CATALOG_RELATION)
        {
            return ReservedTableNameSnafu {
                name: self.logical_name,
            }
            .fail();
        }

        let display_name = self
            .display_name
            .unwrap_or_else(|| self.logical_name.clone());
        if display_name.trim().is_empty() {
            return EmptyDisplayNameSnafu.fail();
        }
        ensure_name_len("display name", &display_name)?;

        validate_columns(&self.columns)?;

        Ok(ValidatedSpec {
            logical_name: self.logical_name,
            display_name,
            owner: self.owner,
            columns: self.columns,
        })
    }
}

impl ValidatedSpec {
    /// Unique logical name, also used as the physical table name.
    pub fn logical_name(&self) -> &str {
        &self.logical_name
    }

    /// Unique human-readable label.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Owning principal.
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Ordered user columns (the row identifier is not included).
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

fn ensure_name_len(what: &str, name: &str) -> Result<(), SchemaError> {
    ensure!(
        name.chars().count() <= MAX_NAME_LEN,
        NameTooLongSnafu {
            what: what.to_string(),
            name: name.to_string(),
            max: MAX_NAME_LEN,
        }
    );
    Ok(())
}

/// Enforce the column-list rules: non-empty, bounded, every name non-empty,
/// distinct and not the row identifier.
pub fn validate_columns(columns: &[String]) -> Result<(), SchemaError> {
    if columns.is_empty() {
        return EmptyColumnListSnafu.fail();
    }
    ensure!(
        columns.len() <= MAX_COLUMNS,
        TooManyColumnsSnafu {
            count: columns.len(),
            max: MAX_COLUMNS,
        }
    );

    let mut seen = HashSet::with_capacity(columns.len());
    for (position, column) in columns.iter().enumerate() {
        if column.trim().is_empty() {
            return EmptyColumnNameSnafu { position }.fail();
        }
        ensure_name_len("column name", column)?;
        if column.eq_ignore_ascii_case(ROW_ID_COLUMN) {
            return ReservedColumnSnafu {
                column: column.clone(),
            }
            .fail();
        }
        // SQLite compares identifiers case-insensitively.
        if !seen.insert(column.to_lowercase()) {
            return DuplicateColumnSnafu {
                column: column.clone(),
            }
            .fail();
        }
    }
    Ok(())
}
