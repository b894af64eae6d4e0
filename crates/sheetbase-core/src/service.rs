//! The `Sheetbase` service: one entry point per transport action.
//!
//! Front ends hold a single [`Sheetbase`] and never wire the catalog,
//! manager, ingestor and exporter themselves. Every action returns
//! [`SheetbaseError`], whose [`kind`](SheetbaseError::kind) is what a
//! transport maps to its own status codes.

use arrow::array::RecordBatch;
use log::info;
use snafu::prelude::*;

use crate::{
    catalog::{self, CatalogError, SchemaCatalog, TableDescriptor, TableId},
    config::{ConfigError, IngestSettings, SheetbaseConfig},
    error::ErrorKind,
    export::{ExportError, ExportFormat, Exporter},
    ingest::{self, BatchPolicy, BatchReport, IngestError, Ingestor, NamedBatch, RowBatch},
    manager::{self, CreateOutcome, DuplicatePolicy, TableError, TableManager},
    schema::TableSpec,
    spreadsheet::{self, SpreadsheetError},
    storage::{self, StorageError, StoragePool},
};

/// Errors surfaced by [`Sheetbase`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SheetbaseError {
    /// Configuration could not be loaded or is invalid.
    #[snafu(display("{source}"))]
    Config {
        /// Underlying configuration error.
        source: ConfigError,
    },

    /// The storage engine could not be reached.
    #[snafu(display("{source}"))]
    Storage {
        /// Underlying storage error.
        #[snafu(backtrace)]
        source: StorageError,
    },

    /// A catalog read failed.
    #[snafu(display("{source}"))]
    Catalog {
        /// Underlying catalog error.
        #[snafu(source(from(CatalogError, Box::new)))]
        source: Box<CatalogError>,
    },

    /// Creating or deleting a table failed.
    #[snafu(display("{source}"))]
    Table {
        /// Underlying table error.
        source: TableError,
    },

    /// Appending rows failed.
    #[snafu(display("{source}"))]
    Ingest {
        /// Underlying ingestion error.
        source: IngestError,
    },

    /// An uploaded file was rejected before ingestion.
    #[snafu(display("File {file}: {source}"))]
    Upload {
        /// Name of the uploaded file.
        file: String,
        /// Underlying codec error.
        source: SpreadsheetError,
    },

    /// Reading a table back out failed.
    #[snafu(display("{source}"))]
    Export {
        /// Underlying export error.
        source: ExportError,
    },
}

impl SheetbaseError {
    /// Coarse classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SheetbaseError::Config { .. } => ErrorKind::InvalidInput,
            SheetbaseError::Storage { .. } => ErrorKind::Storage,
            SheetbaseError::Catalog { source } => manager::catalog_error_kind(source),
            SheetbaseError::Table { source } => source.kind(),
            SheetbaseError::Ingest { source } => source.kind(),
            SheetbaseError::Upload { source, .. } => source.kind(),
            SheetbaseError::Export { source } => source.kind(),
        }
    }
}

/// Result alias for service actions.
pub type SheetbaseResult<T> = Result<T, SheetbaseError>;

/// Dynamic tables, ingestion and export over one connection pool.
#[derive(Debug, Clone)]
pub struct Sheetbase {
    pool: StoragePool,
    settings: IngestSettings,
    manager: TableManager,
    ingestor: Ingestor,
    exporter: Exporter,
}

impl Sheetbase {
    /// Validate `config`, open the pool and make sure the catalog exists.
    pub async fn open(config: &SheetbaseConfig) -> SheetbaseResult<Self> {
        config.validate().context(ConfigSnafu)?;
        let pool = StoragePool::connect(&config.database)
            .await
            .context(StorageSnafu)?;
        Self::with_pool(pool, config.ingest.clone()).await
    }

    /// Build the service over an existing pool.
    pub async fn with_pool(pool: StoragePool, settings: IngestSettings) -> SheetbaseResult<Self> {
        let mut session = pool.session().await.context(StorageSnafu)?;
        catalog::ensure_catalog_relation(&mut session)
            .await
            .context(CatalogSnafu)?;
        drop(session);

        Ok(Self {
            manager: TableManager::new(pool.clone(), settings.max_value_len),
            ingestor: Ingestor::new(pool.clone(), settings.max_value_len),
            exporter: Exporter::new(pool.clone()),
            pool,
            settings,
        })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &StoragePool {
        &self.pool
    }

    /// Active ingestion settings.
    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    /// Create a table using the configured duplicate policy.
    pub async fn create_table(&self, spec: TableSpec) -> SheetbaseResult<CreateOutcome> {
        self.create_table_with_policy(spec, self.settings.duplicate_policy)
            .await
    }

    /// Create a table with an explicit duplicate policy.
    pub async fn create_table_with_policy(
        &self,
        spec: TableSpec,
        policy: DuplicatePolicy,
    ) -> SheetbaseResult<CreateOutcome> {
        self.manager
            .create_table(spec, policy)
            .await
            .context(TableSnafu)
    }

    /// Create table `name` from a spreadsheet's header and load its rows,
    /// all in one transaction.
    ///
    /// If the name is already taken and the duplicate policy is idempotent,
    /// nothing is ingested and the existing descriptor is returned with a
    /// row count of zero.
    pub async fn create_table_from_spreadsheet(
        &self,
        name: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> SheetbaseResult<(CreateOutcome, u64)> {
        let batch = spreadsheet::decode_upload(file_name, bytes).context(UploadSnafu {
            file: file_name,
        })?;
        let spec = TableSpec::new(name, batch.columns().to_vec())
            .validate()
            .context(manager::InvalidSchemaSnafu)
            .context(TableSnafu)?;

        let mut tx = self.pool.begin().await.context(StorageSnafu)?;
        let descriptor =
            match manager::create_table_in(&mut tx, &spec, self.settings.max_value_len).await {
                Ok(descriptor) => descriptor,
                Err(TableError::DuplicateName { field, name }) => {
                    drop(tx);
                    let outcome = manager::resolve_duplicate(
                        &self.pool,
                        &spec,
                        field,
                        name,
                        self.settings.duplicate_policy,
                    )
                    .await
                    .context(TableSnafu)?;
                    return Ok((outcome, 0));
                }
                Err(e) => return Err(e).context(TableSnafu),
            };

        let rows = ingest::append_rows(&mut tx, &descriptor, &batch, self.settings.max_value_len)
            .await
            .context(IngestSnafu)?;
        storage::commit(tx).await.context(StorageSnafu)?;

        info!(
            "created table '{}' (id {}) from {file_name} with {rows} rows",
            descriptor.logical_name, descriptor.id
        );
        Ok((CreateOutcome::Created(descriptor), rows))
    }

    /// Soft-delete a table.
    pub async fn delete_table(&self, id: TableId) -> SheetbaseResult<()> {
        self.manager.delete_table(id).await.context(TableSnafu)
    }

    /// Every table ordered by identifier; soft-deleted ones only on request.
    pub async fn list_tables(&self, include_deleted: bool) -> SheetbaseResult<Vec<TableDescriptor>> {
        let mut session = self.pool.session().await.context(StorageSnafu)?;
        SchemaCatalog::new(&mut session)
            .list_all(include_deleted)
            .await
            .context(CatalogSnafu)
    }

    /// Manual entry: append a JSON array of objects whose keys, in order,
    /// match the table's columns.
    pub async fn insert_records(&self, id: TableId, json: &str) -> SheetbaseResult<u64> {
        let batch = RowBatch::from_json(json).context(IngestSnafu)?;
        self.ingestor.ingest(id, &batch).await.context(IngestSnafu)
    }

    /// Append an already-built batch.
    pub async fn insert_batch(&self, id: TableId, batch: &RowBatch) -> SheetbaseResult<u64> {
        self.ingestor.ingest(id, batch).await.context(IngestSnafu)
    }

    /// Append one uploaded spreadsheet.
    pub async fn ingest_single(
        &self,
        id: TableId,
        file_name: &str,
        bytes: &[u8],
    ) -> SheetbaseResult<u64> {
        let batch = spreadsheet::decode_upload(file_name, bytes).context(UploadSnafu {
            file: file_name,
        })?;
        self.ingestor.ingest(id, &batch).await.context(IngestSnafu)
    }

    /// Append several uploaded spreadsheets under `policy` (the configured
    /// policy when `None`).
    ///
    /// Every file name is checked and every file decoded before any row is
    /// written; a file that fails either check fails the whole request.
    pub async fn ingest_multiple(
        &self,
        id: TableId,
        files: &[(String, Vec<u8>)],
        policy: Option<BatchPolicy>,
    ) -> SheetbaseResult<BatchReport> {
        for (file_name, _) in files {
            spreadsheet::ensure_supported_extension(file_name).context(UploadSnafu {
                file: file_name.as_str(),
            })?;
        }

        let mut batches = Vec::with_capacity(files.len());
        for (file_name, bytes) in files {
            let batch = spreadsheet::decode_xlsx(bytes).context(UploadSnafu {
                file: file_name.as_str(),
            })?;
            batches.push(NamedBatch::new(file_name.as_str(), batch));
        }

        let policy = policy.unwrap_or(self.settings.batch_policy);
        self.ingestor
            .ingest_many(id, &batches, policy)
            .await
            .context(IngestSnafu)
    }

    /// Serialize table `id` (optionally projected) in `format`.
    pub async fn export(
        &self,
        id: TableId,
        projection: Option<&[String]>,
        format: ExportFormat,
    ) -> SheetbaseResult<Vec<u8>> {
        self.exporter
            .export(id, projection, format)
            .await
            .context(ExportSnafu)
    }

    /// Every row of table `id`, including the row identifier.
    pub async fn show(&self, id: TableId) -> SheetbaseResult<RecordBatch> {
        self.exporter
            .read_table(id, None)
            .await
            .context(ExportSnafu)
    }

    /// Number of rows in table `id`.
    pub async fn row_count(&self, id: TableId) -> SheetbaseResult<u64> {
        self.exporter.row_count(id).await.context(ExportSnafu)
    }

    /// Pearson correlation between two columns of table `id`.
    pub async fn correlate(&self, id: TableId, a: &str, b: &str) -> SheetbaseResult<Option<f64>> {
        self.exporter
            .correlate(id, a, b)
            .await
            .context(ExportSnafu)
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
