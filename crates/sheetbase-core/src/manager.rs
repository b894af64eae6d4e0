//! Dynamic table manager.
//!
//! Turns a validated column list into a physical table plus a catalog entry,
//! as one unit of work:
//!
//! 1. Validate the [`TableSpec`] (no DDL for bad input).
//! 2. Open a transaction.
//! 3. Register the descriptor. The catalog's unique constraints decide name
//!    collisions, including concurrent creations of the same name.
//! 4. Issue `CREATE TABLE` with the implicit row identifier and one bounded
//!    text column per requested column.
//! 5. Commit. Any failure before this point rolls both actions back.
//!
//! A collision is resolved by [`DuplicatePolicy`]: either an error, or the
//! soft [`CreateOutcome::AlreadyExists`] carrying the descriptor that holds
//! the name.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use sqlx::SqliteConnection;

use crate::{
    catalog::{CatalogError, NameField, SchemaCatalog, TableDescriptor, TableId},
    error::ErrorKind,
    schema::{ROW_ID_COLUMN, SchemaError, TableSpec, ValidatedSpec},
    storage::{self, QuerySnafu, StorageError, StoragePool, quote_identifier},
};

/// What to do when the requested name is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Fail with [`TableError::DuplicateName`].
    Reject,
    /// Succeed with [`CreateOutcome::AlreadyExists`] and change nothing.
    #[default]
    Idempotent,
}

/// Result of a successful `create_table` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// A new physical table and descriptor were committed.
    Created(TableDescriptor),
    /// The name was already taken; nothing was changed. Carries the
    /// descriptor holding the name (possibly soft-deleted).
    AlreadyExists(TableDescriptor),
}

impl CreateOutcome {
    /// The created or pre-existing descriptor.
    pub fn descriptor(&self) -> &TableDescriptor {
        match self {
            CreateOutcome::Created(d) | CreateOutcome::AlreadyExists(d) => d,
        }
    }

    /// Whether this call created the table.
    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }
}

/// Errors from table creation and deletion.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TableError {
    /// The requested definition is malformed.
    #[snafu(display("Invalid table definition: {source}"))]
    InvalidSchema {
        /// Which rule was violated.
        source: SchemaError,
    },

    /// The name is taken and the caller asked for [`DuplicatePolicy::Reject`].
    #[snafu(display("Table already exists: the {field} '{name}' is already taken"))]
    DuplicateName {
        /// Which name collided.
        field: NameField,
        /// The requested value.
        name: String,
    },

    /// Catalog read or write failure.
    #[snafu(display("Catalog error: {source}"))]
    Catalog {
        /// Underlying catalog error.
        #[snafu(source(from(CatalogError, Box::new)))]
        source: Box<CatalogError>,
    },

    /// DDL or session failure in the storage engine.
    #[snafu(display("Storage error while managing tables: {source}"))]
    Storage {
        /// Underlying storage error.
        #[snafu(backtrace)]
        source: StorageError,
    },
}

impl TableError {
    /// Coarse classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TableError::InvalidSchema { .. } => ErrorKind::InvalidSchema,
            TableError::DuplicateName { .. } => ErrorKind::DuplicateName,
            TableError::Catalog { source } => catalog_error_kind(source),
            TableError::Storage { .. } => ErrorKind::Storage,
        }
    }
}

/// Classification shared by every layer that wraps [`CatalogError`].
pub(crate) fn catalog_error_kind(err: &CatalogError) -> ErrorKind {
    match err {
        CatalogError::DuplicateName { .. } => ErrorKind::DuplicateName,
        CatalogError::NotFound { .. } => ErrorKind::NotFound,
        CatalogError::CorruptDescriptor { .. } | CatalogError::Storage { .. } => ErrorKind::Storage,
    }
}

impl From<CatalogError> for TableError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::DuplicateName { field, name } => TableError::DuplicateName { field, name },
            other => TableError::Catalog {
                source: Box::new(other),
            },
        }
    }
}

/// Creates and soft-deletes dynamic tables.
#[derive(Debug, Clone)]
pub struct TableManager {
    pool: StoragePool,
    max_value_len: usize,
}

impl TableManager {
    /// Manager over `pool`; user columns are declared `VARCHAR(max_value_len)`.
    pub fn new(pool: StoragePool, max_value_len: usize) -> Self {
        Self {
            pool,
            max_value_len,
        }
    }

    /// Validate `spec`, then register and materialize it atomically.
    pub async fn create_table(
        &self,
        spec: TableSpec,
        policy: DuplicatePolicy,
    ) -> Result<CreateOutcome, TableError> {
        let spec = spec.validate().context(InvalidSchemaSnafu)?;

        let mut tx = self.pool.begin().await.context(StorageSnafu)?;
        match create_table_in(&mut tx, &spec, self.max_value_len).await {
            Ok(descriptor) => {
                storage::commit(tx).await.context(StorageSnafu)?;
                info!(
                    "created table '{}' (id {}) with {} columns",
                    descriptor.logical_name,
                    descriptor.id,
                    descriptor.columns.len()
                );
                Ok(CreateOutcome::Created(descriptor))
            }
            Err(TableError::DuplicateName { field, name }) => {
                drop(tx);
                resolve_duplicate(&self.pool, &spec, field, name, policy).await
            }
            Err(e) => Err(e),
        }
    }

    /// Soft-delete the table; its physical storage is retained.
    pub async fn delete_table(&self, id: TableId) -> Result<(), TableError> {
        let mut tx = self.pool.begin().await.context(StorageSnafu)?;
        SchemaCatalog::new(&mut tx).soft_delete(id).await?;
        storage::commit(tx).await.context(StorageSnafu)?;
        info!("soft-deleted table {id}");
        Ok(())
    }
}

/// Register `spec` and create its physical table on `conn`.
///
/// The caller owns the transaction: nothing is committed here, and a
/// [`TableError::DuplicateName`] leaves the transaction for the caller to
/// roll back.
pub async fn create_table_in(
    conn: &mut SqliteConnection,
    spec: &ValidatedSpec,
    max_value_len: usize,
) -> Result<TableDescriptor, TableError> {
    let descriptor = SchemaCatalog::new(&mut *conn).register(spec).await?;

    let ddl = create_table_ddl(spec.logical_name(), spec.columns(), max_value_len);
    debug!("materializing '{}': {ddl}", spec.logical_name());

    sqlx::query(&ddl)
        .execute(&mut *conn)
        .await
        .context(QuerySnafu {
            operation: format!("create table {}", spec.logical_name()),
        })
        .context(StorageSnafu)?;

    Ok(descriptor)
}

/// Apply `policy` to a name collision reported by the catalog.
///
/// Only a live holder can be returned as [`CreateOutcome::AlreadyExists`];
/// a name held by a soft-deleted table is a duplicate under either policy.
pub(crate) async fn resolve_duplicate(
    pool: &StoragePool,
    spec: &ValidatedSpec,
    field: NameField,
    name: String,
    policy: DuplicatePolicy,
) -> Result<CreateOutcome, TableError> {
    if policy == DuplicatePolicy::Reject {
        return DuplicateNameSnafu { field, name }.fail();
    }

    let mut session = pool.session().await.context(StorageSnafu)?;
    let holder = SchemaCatalog::new(&mut session)
        .find_holder(spec.logical_name(), spec.display_name())
        .await?;

    match holder {
        // A soft-deleted table keeps its name but cannot be handed back.
        Some(existing) if existing.deleted => {
            info!(
                "name '{name}' is reserved by deleted table {}",
                existing.id
            );
            DuplicateNameSnafu { field, name }.fail()
        }
        Some(existing) => {
            info!(
                "table '{}' already exists (id {}); nothing created",
                existing.logical_name, existing.id
            );
            Ok(CreateOutcome::AlreadyExists(existing))
        }
        None => DuplicateNameSnafu { field, name }.fail(),
    }
}

/// DDL for a dynamic table: implicit integer row identifier plus one
/// `VARCHAR(max_value_len)` column per user column, in order.
pub fn create_table_ddl(table: &str, columns: &[String], max_value_len: usize) -> String {
    let mut defs = Vec::with_capacity(columns.len() + 1);
    defs.push(format!(
        "{} INTEGER PRIMARY KEY AUTOINCREMENT",
        quote_identifier(ROW_ID_COLUMN)
    ));
    defs.extend(
        columns
            .iter()
            .map(|c| format!("{} VARCHAR({max_value_len})", quote_identifier(c))),
    );
    format!("CREATE TABLE {} ({})", quote_identifier(table), defs.join(", "))
}
