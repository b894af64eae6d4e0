//! Ingestion pipeline: append row batches to existing dynamic tables.
//!
//! Every append follows the same steps:
//!
//! 1. Resolve the descriptor; absent or soft-deleted tables are `NotFound`.
//! 2. Require the incoming header to equal the recorded columns exactly
//!    (same names, same order).
//! 3. Check every value against the per-column length bound.
//! 4. Insert the rows in chunks that respect the engine's bind limit.
//!
//! Steps 1-4 run inside one transaction per file, so a rejected file commits
//! nothing. Multi-file requests follow a [`BatchPolicy`].

mod batch;
mod error;
mod report;

use log::{debug, info, warn};
use snafu::prelude::*;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

pub use batch::{Cell, NamedBatch, Record, RowBatch};
pub use error::IngestError;
pub(crate) use error::StorageSnafu;
use error::{InFileSnafu, NotFoundSnafu, SchemaMismatchSnafu, ValueTooLongSnafu};
pub use report::{BatchPolicy, BatchReport, BatchReportBuilder, FileOutcome, FileReport};

use crate::{
    catalog::{SchemaCatalog, TableDescriptor, TableId},
    storage::{self, QuerySnafu, StoragePool, quote_identifier},
};

/// Upper bound on bound parameters per `INSERT` statement.
const MAX_BIND_PARAMS: usize = 999;

/// Appends row batches to dynamic tables.
#[derive(Debug, Clone)]
pub struct Ingestor {
    pool: StoragePool,
    max_value_len: usize,
}

impl Ingestor {
    /// Ingestor over `pool` enforcing `max_value_len` characters per value.
    pub fn new(pool: StoragePool, max_value_len: usize) -> Self {
        Self {
            pool,
            max_value_len,
        }
    }

    /// Append one batch atomically; returns the number of rows inserted.
    pub async fn ingest(&self, id: TableId, batch: &RowBatch) -> Result<u64, IngestError> {
        let mut tx = self.pool.begin().await.context(StorageSnafu)?;
        let (descriptor, rows) = ingest_in(&mut tx, id, batch, self.max_value_len).await?;
        storage::commit(tx).await.context(StorageSnafu)?;

        info!(
            "ingested {rows} rows into '{}' (id {id})",
            descriptor.logical_name
        );
        Ok(rows)
    }

    /// Append several batches to one table under `policy`.
    ///
    /// A missing or deleted table fails the whole request up front. Under
    /// [`BatchPolicy::AllOrNothing`] the first failing file is returned as an
    /// error and nothing is committed; the other policies always return a
    /// report.
    pub async fn ingest_many(
        &self,
        id: TableId,
        batches: &[NamedBatch],
        policy: BatchPolicy,
    ) -> Result<BatchReport, IngestError> {
        self.live_descriptor(id).await?;

        let mut report = BatchReportBuilder::new(id, policy);

        if policy == BatchPolicy::AllOrNothing {
            let mut tx = self.pool.begin().await.context(StorageSnafu)?;
            let mut counts = Vec::with_capacity(batches.len());
            for named in batches {
                let (_, rows) = ingest_in(&mut tx, id, &named.batch, self.max_value_len)
                    .await
                    .context(InFileSnafu {
                        file: named.source.clone(),
                    })?;
                counts.push(rows);
            }
            storage::commit(tx).await.context(StorageSnafu)?;

            for (named, rows) in batches.iter().zip(counts) {
                report.push(named.source.as_str(), FileOutcome::Ingested { rows });
            }
        } else {
            let mut stopped = false;
            for named in batches {
                if stopped {
                    report.push(named.source.as_str(), FileOutcome::Skipped);
                    continue;
                }
                match self.ingest(id, &named.batch).await {
                    Ok(rows) => report.push(named.source.as_str(), FileOutcome::Ingested { rows }),
                    Err(e) => {
                        warn!("file {} rejected: {e}", named.source);
                        report.push(
                            named.source.as_str(),
                            FileOutcome::Failed {
                                kind: e.kind(),
                                reason: e.to_string(),
                            },
                        );
                        stopped = policy == BatchPolicy::StopOnFirstError;
                    }
                }
            }
        }

        let report = report.finish();
        info!(
            "multi-file ingest into table {id}: {} ingested, {} failed, {} skipped, {} rows",
            report.ingested(),
            report.failed(),
            report.skipped(),
            report.total_rows()
        );
        Ok(report)
    }

    async fn live_descriptor(&self, id: TableId) -> Result<TableDescriptor, IngestError> {
        let mut session = self.pool.session().await.context(StorageSnafu)?;
        let descriptor = SchemaCatalog::new(&mut session).find_by_id(id).await?;
        ensure!(descriptor.is_live(), NotFoundSnafu { id });
        Ok(descriptor)
    }
}

/// Resolve table `id` on `conn` and append `batch` to it.
///
/// The caller owns the transaction.
pub async fn ingest_in(
    conn: &mut SqliteConnection,
    id: TableId,
    batch: &RowBatch,
    max_value_len: usize,
) -> Result<(TableDescriptor, u64), IngestError> {
    let descriptor = SchemaCatalog::new(&mut *conn).find_by_id(id).await?;
    ensure!(descriptor.is_live(), NotFoundSnafu { id });

    let rows = append_rows(conn, &descriptor, batch, max_value_len).await?;
    Ok((descriptor, rows))
}

/// Validate `batch` against `descriptor` and insert its rows on `conn`.
pub async fn append_rows(
    conn: &mut SqliteConnection,
    descriptor: &TableDescriptor,
    batch: &RowBatch,
    max_value_len: usize,
) -> Result<u64, IngestError> {
    // An empty record list carries no header to check.
    if batch.columns().is_empty() && batch.is_empty() {
        return Ok(0);
    }
    ensure_columns_match(descriptor, batch.columns())?;
    ensure_values_fit(batch, max_value_len)?;

    if batch.is_empty() {
        return Ok(0);
    }

    let table = quote_identifier(&descriptor.logical_name);
    let column_list = descriptor
        .columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");
    let rows_per_statement = (MAX_BIND_PARAMS / descriptor.columns.len().max(1)).max(1);

    let mut inserted = 0u64;
    for chunk in batch.rows().chunks(rows_per_statement) {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("INSERT INTO {table} ({column_list}) "));
        builder.push_values(chunk, |mut values, row| {
            for cell in row {
                values.push_bind(cell.as_deref());
            }
        });

        let result = builder
            .build()
            .execute(&mut *conn)
            .await
            .context(QuerySnafu {
                operation: format!("insert into {}", descriptor.logical_name),
            })
            .context(StorageSnafu)?;
        inserted += result.rows_affected();
    }

    debug!(
        "appended {inserted} rows to '{}' in statements of up to {rows_per_statement} rows",
        descriptor.logical_name
    );
    Ok(inserted)
}

/// The incoming header must equal the recorded column list exactly.
pub fn ensure_columns_match(
    descriptor: &TableDescriptor,
    actual: &[String],
) -> Result<(), IngestError> {
    ensure!(
        descriptor.columns.as_slice() == actual,
        SchemaMismatchSnafu {
            table: descriptor.logical_name.clone(),
            expected: descriptor.columns.clone(),
            actual: actual.to_vec(),
        }
    );
    Ok(())
}

fn ensure_values_fit(batch: &RowBatch, max_value_len: usize) -> Result<(), IngestError> {
    for (row_idx, row) in batch.rows().iter().enumerate() {
        for (column, cell) in batch.columns().iter().zip(row) {
            let Some(value) = cell else { continue };
            let len = value.chars().count();
            ensure!(
                len <= max_value_len,
                ValueTooLongSnafu {
                    row: row_idx + 1,
                    column: column.clone(),
                    len,
                    max: max_value_len,
                }
            );
        }
    }
    Ok(())
}
