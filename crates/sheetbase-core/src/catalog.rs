//! Schema catalog: the authoritative record of every dynamic table.
//!
//! Descriptors live in the `sheet_tables` relation of the same database as
//! the tables they describe:
//!
//! ```text
//! sheet_tables(
//!   id            INTEGER PRIMARY KEY AUTOINCREMENT,
//!   logical_name  TEXT NOT NULL UNIQUE COLLATE NOCASE,
//!   display_name  TEXT NOT NULL UNIQUE,
//!   owner         INTEGER NOT NULL DEFAULT 0,
//!   columns       TEXT NOT NULL,            -- JSON array of column names
//!   deleted       INTEGER NOT NULL DEFAULT 0,
//!   created_at    TEXT NOT NULL             -- RFC 3339
//! )
//! ```
//!
//! [`SchemaCatalog`] borrows a connection, so every operation runs inside
//! whatever transaction the caller opened on it. The unique constraints are
//! the source of truth for name collisions: [`SchemaCatalog::register`] maps
//! a constraint violation to [`CatalogError::DuplicateName`] instead of
//! pre-checking, which keeps concurrent creations race-free.
//!
//! Names stay reserved after a soft delete because the physical table is
//! retained under the same name. Logical names compare case-insensitively,
//! like the engine's own table names.

mod descriptor;
mod error;

use chrono::{DateTime, Utc};
use log::debug;
use snafu::{IntoError, prelude::*};
use sqlx::{Row, SqliteConnection, sqlite::SqliteRow};

pub use descriptor::{OwnerId, TableDescriptor, TableId};
pub(crate) use error::{DuplicateNameSnafu, NotFoundSnafu};
pub use error::{CatalogError, NameField};
use error::{CorruptDescriptorSnafu, StorageSnafu};

use crate::{
    schema::ValidatedSpec,
    storage::{QuerySnafu, unique_violation_message},
};

/// Name of the catalog relation.
pub const CATALOG_RELATION: &str = "sheet_tables";

const SELECT_DESCRIPTOR: &str = "SELECT id, logical_name, display_name, owner, columns, deleted, created_at \
     FROM sheet_tables";

/// Result alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Create the catalog relation if it does not exist yet.
pub async fn ensure_catalog_relation(conn: &mut SqliteConnection) -> CatalogResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS sheet_tables (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            logical_name TEXT NOT NULL UNIQUE COLLATE NOCASE,
            display_name TEXT NOT NULL UNIQUE,
            owner INTEGER NOT NULL DEFAULT 0,
            columns TEXT NOT NULL,
            deleted INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )",
    )
    .execute(&mut *conn)
    .await
    .context(QuerySnafu {
        operation: "create catalog relation",
    })
    .context(StorageSnafu)?;

    sqlx::query("CREATE INDEX IF NOT EXISTS sheet_tables_owner ON sheet_tables (owner)")
        .execute(&mut *conn)
        .await
        .context(QuerySnafu {
            operation: "create catalog owner index",
        })
        .context(StorageSnafu)?;

    Ok(())
}

/// Catalog view over a borrowed connection (usually an open transaction).
pub struct SchemaCatalog<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> SchemaCatalog<'c> {
    /// Bind the catalog to `conn`.
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Insert a new descriptor for `spec`.
    ///
    /// Fails with [`CatalogError::DuplicateName`] if the logical or display
    /// name is already held by another descriptor.
    pub async fn register(&mut self, spec: &ValidatedSpec) -> CatalogResult<TableDescriptor> {
        let columns = serde_json::to_string(spec.columns()).map_err(|e| {
            CatalogError::CorruptDescriptor {
                id: 0,
                message: format!("failed to encode column list: {e}"),
            }
        })?;
        let created_at = Utc::now();

        let result = sqlx::query(
            "INSERT INTO sheet_tables (logical_name, display_name, owner, columns, deleted, created_at) \
             VALUES (?, ?, ?, ?, 0, ?)",
        )
        .bind(spec.logical_name())
        .bind(spec.display_name())
        .bind(spec.owner().0)
        .bind(&columns)
        .bind(created_at.to_rfc3339())
        .execute(&mut *self.conn)
        .await;

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                if let Some(message) = unique_violation_message(&e) {
                    let (field, name) = if message.contains("display_name") {
                        (NameField::Display, spec.display_name())
                    } else {
                        (NameField::Logical, spec.logical_name())
                    };
                    return DuplicateNameSnafu { field, name }.fail();
                }
                return Err(e)
                    .context(QuerySnafu {
                        operation: format!("register table {}", spec.logical_name()),
                    })
                    .context(StorageSnafu);
            }
        };

        let id = TableId(result.last_insert_rowid());
        debug!("registered descriptor {id} for '{}'", spec.logical_name());

        Ok(TableDescriptor {
            id,
            logical_name: spec.logical_name().to_string(),
            display_name: spec.display_name().to_string(),
            owner: spec.owner(),
            columns: spec.columns().to_vec(),
            deleted: false,
            created_at,
        })
    }

    /// Look up a descriptor by identifier, soft-deleted or not.
    pub async fn find_by_id(&mut self, id: TableId) -> CatalogResult<TableDescriptor> {
        let sql = format!("{SELECT_DESCRIPTOR} WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.0)
            .fetch_optional(&mut *self.conn)
            .await
            .context(QuerySnafu {
                operation: format!("find table {id}"),
            })
            .context(StorageSnafu)?;

        match row {
            Some(row) => descriptor_from_row(&row),
            None => NotFoundSnafu { id }.fail(),
        }
    }

    /// Look up a non-deleted descriptor by logical name.
    pub async fn find_by_name(&mut self, logical_name: &str) -> CatalogResult<Option<TableDescriptor>> {
        let sql = format!("{SELECT_DESCRIPTOR} WHERE logical_name = ? AND deleted = 0");
        let row = sqlx::query(&sql)
            .bind(logical_name)
            .fetch_optional(&mut *self.conn)
            .await
            .context(QuerySnafu {
                operation: format!("find table '{logical_name}'"),
            })
            .context(StorageSnafu)?;

        row.as_ref().map(descriptor_from_row).transpose()
    }

    /// The descriptor (live ones first) that holds either name, if any.
    pub async fn find_holder(
        &mut self,
        logical_name: &str,
        display_name: &str,
    ) -> CatalogResult<Option<TableDescriptor>> {
        let sql = format!(
            "{SELECT_DESCRIPTOR} WHERE logical_name = ? OR display_name = ? \
             ORDER BY deleted, id LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(logical_name)
            .bind(display_name)
            .fetch_optional(&mut *self.conn)
            .await
            .context(QuerySnafu {
                operation: format!("find holder of '{logical_name}'"),
            })
            .context(StorageSnafu)?;

        row.as_ref().map(descriptor_from_row).transpose()
    }

    /// All descriptors ordered by identifier; soft-deleted ones only when
    /// `include_deleted` is set.
    pub async fn list_all(&mut self, include_deleted: bool) -> CatalogResult<Vec<TableDescriptor>> {
        let sql = if include_deleted {
            format!("{SELECT_DESCRIPTOR} ORDER BY id")
        } else {
            format!("{SELECT_DESCRIPTOR} WHERE deleted = 0 ORDER BY id")
        };
        let rows = sqlx::query(&sql)
            .fetch_all(&mut *self.conn)
            .await
            .context(QuerySnafu {
                operation: "list tables",
            })
            .context(StorageSnafu)?;

        rows.iter().map(descriptor_from_row).collect()
    }

    /// Mark a descriptor deleted. Deleting twice is not an error.
    pub async fn soft_delete(&mut self, id: TableId) -> CatalogResult<()> {
        let result = sqlx::query("UPDATE sheet_tables SET deleted = 1 WHERE id = ?")
            .bind(id.0)
            .execute(&mut *self.conn)
            .await
            .context(QuerySnafu {
                operation: format!("soft delete table {id}"),
            })
            .context(StorageSnafu)?;

        ensure!(result.rows_affected() > 0, NotFoundSnafu { id });
        Ok(())
    }
}

fn decode_error(source: sqlx::Error) -> CatalogError {
    CatalogError::Storage {
        source: QuerySnafu {
            operation: "decode catalog row",
        }
        .into_error(source),
    }
}

fn descriptor_from_row(row: &SqliteRow) -> CatalogResult<TableDescriptor> {
    let id: i64 = row.try_get("id").map_err(decode_error)?;
    let logical_name: String = row.try_get("logical_name").map_err(decode_error)?;
    let display_name: String = row.try_get("display_name").map_err(decode_error)?;
    let owner: i64 = row.try_get("owner").map_err(decode_error)?;
    let columns_json: String = row.try_get("columns").map_err(decode_error)?;
    let deleted: i64 = row.try_get("deleted").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;

    let columns: Vec<String> =
        serde_json::from_str(&columns_json).map_err(|e| CatalogError::CorruptDescriptor {
            id,
            message: format!("invalid column list {columns_json:?}: {e}"),
        })?;

    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| {
            CorruptDescriptorSnafu {
                id,
                message: format!("invalid created_at {created_at:?}: {e}"),
            }
            .build()
        })?
        .with_timezone(&Utc);

    Ok(TableDescriptor {
        id: TableId(id),
        logical_name,
        display_name,
        owner: OwnerId(owner),
        columns,
        deleted: deleted != 0,
        created_at,
    })
}
