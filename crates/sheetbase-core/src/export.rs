//! Export and query façade over dynamic tables.
//!
//! [`Exporter::read_table`] streams a table (or a projection of it) into a
//! single Arrow [`RecordBatch`] ordered by row identifier. Everything else in
//! this module works on that batch: the download serializers and the
//! correlation helper.

mod correlation;
mod error;
mod writer;

use std::sync::Arc;

use arrow::{
    array::{ArrayRef, Int64Builder, RecordBatch, StringBuilder},
    datatypes::{DataType, Field, Schema},
};
use futures::TryStreamExt;
use log::debug;
use snafu::prelude::*;
use sqlx::Row;

pub use correlation::{numeric_values, parse_numeric, pearson};
pub use error::ExportError;
use error::{ArrowSnafu, EmptyProjectionSnafu, NotFoundSnafu, StorageSnafu, UnknownColumnSnafu};
pub use writer::{ExportFormat, write_export};

use crate::{
    catalog::{SchemaCatalog, TableDescriptor, TableId},
    schema::ROW_ID_COLUMN,
    storage::{QuerySnafu, StoragePool, quote_identifier},
};

enum ColumnBuilder {
    RowId(Int64Builder),
    Text(StringBuilder),
}

impl ColumnBuilder {
    fn for_column(name: &str) -> Self {
        if name == ROW_ID_COLUMN {
            ColumnBuilder::RowId(Int64Builder::new())
        } else {
            ColumnBuilder::Text(StringBuilder::new())
        }
    }

    fn field(&self, name: &str) -> Field {
        match self {
            ColumnBuilder::RowId(_) => Field::new(name, DataType::Int64, false),
            ColumnBuilder::Text(_) => Field::new(name, DataType::Utf8, true),
        }
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            ColumnBuilder::RowId(b) => Arc::new(b.finish()),
            ColumnBuilder::Text(b) => Arc::new(b.finish()),
        }
    }
}

/// Reads dynamic tables back out.
#[derive(Debug, Clone)]
pub struct Exporter {
    pool: StoragePool,
}

impl Exporter {
    /// Exporter over `pool`.
    pub fn new(pool: StoragePool) -> Self {
        Self { pool }
    }

    /// Read table `id` into one batch ordered by row identifier.
    ///
    /// Without a projection the batch holds `id` followed by every user
    /// column. A projection selects exactly the named columns, in order;
    /// `id` may be named like any other column.
    pub async fn read_table(
        &self,
        id: TableId,
        projection: Option<&[String]>,
    ) -> Result<RecordBatch, ExportError> {
        let descriptor = self.live_descriptor(id).await?;
        let columns = resolve_projection(&descriptor, projection)?;

        let select_list = columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {select_list} FROM {} ORDER BY {}",
            quote_identifier(&descriptor.logical_name),
            quote_identifier(ROW_ID_COLUMN)
        );
        let operation = format!("read table {}", descriptor.logical_name);

        let mut builders: Vec<ColumnBuilder> =
            columns.iter().map(|c| ColumnBuilder::for_column(c)).collect();

        let mut session = self.pool.session().await.context(StorageSnafu)?;
        let mut rows = sqlx::query(&sql).fetch(&mut *session);
        let mut row_count = 0usize;
        while let Some(row) = rows
            .try_next()
            .await
            .context(QuerySnafu {
                operation: operation.as_str(),
            })
            .context(StorageSnafu)?
        {
            for (idx, builder) in builders.iter_mut().enumerate() {
                match builder {
                    ColumnBuilder::RowId(b) => {
                        let value: i64 = row
                            .try_get(idx)
                            .context(QuerySnafu {
                                operation: operation.as_str(),
                            })
                            .context(StorageSnafu)?;
                        b.append_value(value);
                    }
                    ColumnBuilder::Text(b) => {
                        let value: Option<String> = row
                            .try_get(idx)
                            .context(QuerySnafu {
                                operation: operation.as_str(),
                            })
                            .context(StorageSnafu)?;
                        b.append_option(value);
                    }
                }
            }
            row_count += 1;
        }
        drop(rows);

        let fields: Vec<Field> = columns
            .iter()
            .zip(&builders)
            .map(|(name, builder)| builder.field(name))
            .collect();
        let arrays: Vec<ArrayRef> = builders.iter_mut().map(ColumnBuilder::finish).collect();

        debug!(
            "read {row_count} rows x {} columns from '{}'",
            columns.len(),
            descriptor.logical_name
        );
        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).context(ArrowSnafu)
    }

    /// Read and serialize table `id`.
    ///
    /// Without a projection every user column is written and `id` is left
    /// out.
    pub async fn export(
        &self,
        id: TableId,
        projection: Option<&[String]>,
        format: ExportFormat,
    ) -> Result<Vec<u8>, ExportError> {
        let batch = match projection {
            Some(columns) => self.read_table(id, Some(columns)).await?,
            None => {
                let descriptor = self.live_descriptor(id).await?;
                self.read_table(id, Some(descriptor.columns.as_slice())).await?
            }
        };
        let bytes = write_export(&batch, format)?;
        debug!(
            "exported table {id} as {format}: {} rows, {} bytes",
            batch.num_rows(),
            bytes.len()
        );
        Ok(bytes)
    }

    /// Number of rows in table `id`.
    pub async fn row_count(&self, id: TableId) -> Result<u64, ExportError> {
        let descriptor = self.live_descriptor(id).await?;
        let sql = format!(
            "SELECT COUNT(*) FROM {}",
            quote_identifier(&descriptor.logical_name)
        );

        let mut session = self.pool.session().await.context(StorageSnafu)?;
        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&mut *session)
            .await
            .context(QuerySnafu {
                operation: format!("count rows of {}", descriptor.logical_name),
            })
            .context(StorageSnafu)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Pearson correlation between columns `a` and `b` of table `id`.
    ///
    /// Values that do not parse as numbers are treated as missing. `None`
    /// means there were fewer than two complete pairs or a column was
    /// constant.
    pub async fn correlate(&self, id: TableId, a: &str, b: &str) -> Result<Option<f64>, ExportError> {
        let projection = if a == b {
            vec![a.to_string()]
        } else {
            vec![a.to_string(), b.to_string()]
        };
        let batch = self.read_table(id, Some(projection.as_slice())).await?;

        let xs = numeric_values(batch.column(0));
        let ys = if a == b {
            xs.clone()
        } else {
            numeric_values(batch.column(1))
        };
        Ok(pearson(&xs, &ys))
    }

    async fn live_descriptor(&self, id: TableId) -> Result<TableDescriptor, ExportError> {
        let mut session = self.pool.session().await.context(StorageSnafu)?;
        let descriptor = SchemaCatalog::new(&mut session).find_by_id(id).await?;
        ensure!(descriptor.is_live(), NotFoundSnafu { id });
        Ok(descriptor)
    }
}

fn resolve_projection(
    descriptor: &TableDescriptor,
    projection: Option<&[String]>,
) -> Result<Vec<String>, ExportError> {
    let Some(requested) = projection else {
        let mut all = Vec::with_capacity(descriptor.columns.len() + 1);
        all.push(ROW_ID_COLUMN.to_string());
        all.extend(descriptor.columns.iter().cloned());
        return Ok(all);
    };

    ensure!(!requested.is_empty(), EmptyProjectionSnafu);
    for column in requested {
        ensure!(
            column == ROW_ID_COLUMN || descriptor.column_position(column).is_some(),
            UnknownColumnSnafu {
                table: descriptor.logical_name.clone(),
                column: column.clone(),
            }
        );
    }
    Ok(requested.to_vec())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use chrono::Utc;

    use super::*;
    use crate::{catalog::OwnerId, error::ErrorKind};

    fn descriptor() -> TableDescriptor {
        TableDescriptor {
            id: TableId(3),
            logical_name: "survey".to_string(),
            display_name: "Survey".to_string(),
            owner: OwnerId::ROOT,
            columns: vec!["name".to_string(), "age".to_string()],
            deleted: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn default_projection_leads_with_row_id() {
        let columns = resolve_projection(&descriptor(), None).expect("columns");
        assert_eq!(columns, ["id", "name", "age"]);
    }

    #[test]
    fn projection_keeps_requested_order() {
        let requested = vec!["age".to_string(), "id".to_string()];
        let columns = resolve_projection(&descriptor(), Some(requested.as_slice())).expect("columns");
        assert_eq!(columns, requested);
    }

    #[test]
    fn unknown_and_empty_projections_are_rejected() {
        let err = resolve_projection(&descriptor(), Some(&["height".to_string()][..])).unwrap_err();
        assert!(matches!(err, ExportError::UnknownColumn { ref column, .. } if column == "height"));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = resolve_projection(&descriptor(), Some(&[][..])).unwrap_err();
        assert!(matches!(err, ExportError::EmptyProjection));
    }
}
