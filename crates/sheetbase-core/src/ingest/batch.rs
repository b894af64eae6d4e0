//! Row batches: the common input shape of the ingestion pipeline.

use serde_json::Value;
use snafu::prelude::*;

use crate::ingest::error::{
    IngestError, InvalidJsonSnafu, NotRecordsSnafu, RaggedRowSnafu, RecordKeysSnafu,
};

/// One stored value; `None` is SQL `NULL`.
pub type Cell = Option<String>;

/// An ordered sequence of named values.
pub type Record = Vec<(String, Cell)>;

/// A header plus rows of equal width.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowBatch {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

/// A batch labelled with where it came from (usually a file name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedBatch {
    /// Source label used in reports.
    pub source: String,
    /// The rows.
    pub batch: RowBatch,
}

impl NamedBatch {
    /// Label `batch` with `source`.
    pub fn new(source: impl Into<String>, batch: RowBatch) -> Self {
        Self {
            source: source.into(),
            batch,
        }
    }
}

impl RowBatch {
    /// Build from a header row and data rows; every row must match the
    /// header's width.
    pub fn from_grid(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self, IngestError> {
        for (idx, row) in rows.iter().enumerate() {
            ensure!(
                row.len() == columns.len(),
                RaggedRowSnafu {
                    row: idx + 1,
                    expected: columns.len(),
                    found: row.len(),
                }
            );
        }
        Ok(Self { columns, rows })
    }

    /// Build from ordered records. The first record fixes the column order;
    /// every other record must repeat the same keys in the same order.
    pub fn from_records(records: Vec<Record>) -> Result<Self, IngestError> {
        let mut records = records.into_iter();
        let Some(first) = records.next() else {
            return Ok(Self::default());
        };

        let (columns, first_row): (Vec<String>, Vec<Cell>) = first.into_iter().unzip();
        let mut rows = vec![first_row];

        for (idx, record) in records.enumerate() {
            let (keys, row): (Vec<String>, Vec<Cell>) = record.into_iter().unzip();
            ensure!(
                keys == columns,
                RecordKeysSnafu {
                    record: idx + 2,
                    expected: columns.clone(),
                    actual: keys,
                }
            );
            rows.push(row);
        }

        Ok(Self { columns, rows })
    }

    /// Parse a JSON array of objects, keeping each object's key order.
    ///
    /// Strings are taken verbatim, `null` becomes `NULL`, numbers and
    /// booleans use their JSON text, nested values are stored as JSON.
    pub fn from_json(json: &str) -> Result<Self, IngestError> {
        let value: Value = serde_json::from_str(json).context(InvalidJsonSnafu)?;
        let Value::Array(items) = value else {
            return NotRecordsSnafu {
                message: format!("found {}", json_type_name(&value)),
            }
            .fail();
        };

        let mut records = Vec::with_capacity(items.len());
        for (idx, item) in items.into_iter().enumerate() {
            let Value::Object(map) = item else {
                return NotRecordsSnafu {
                    message: format!("element {} is {}", idx + 1, json_type_name(&item)),
                }
                .fail();
            };
            records.push(
                map.into_iter()
                    .map(|(key, value)| (key, json_cell(value)))
                    .collect::<Record>(),
            );
        }

        Self::from_records(records)
    }

    /// Column names in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Data rows.
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn json_cell(value: Value) -> Cell {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        nested => Some(nested.to_string()),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn s(v: &str) -> Cell {
        Some(v.to_string())
    }

    #[test]
    fn grid_rejects_ragged_rows() {
        let err = RowBatch::from_grid(
            vec!["a".into(), "b".into()],
            vec![vec![s("1"), s("2")], vec![s("3")]],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            IngestError::RaggedRow {
                row: 2,
                expected: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn records_take_column_order_from_first_record() {
        let batch = RowBatch::from_records(vec![
            vec![("b".into(), s("1")), ("a".into(), s("2"))],
            vec![("b".into(), s("3")), ("a".into(), None)],
        ])
        .expect("batch");
        assert_eq!(batch.columns(), ["b".to_string(), "a".to_string()]);
        assert_eq!(batch.rows()[1], vec![s("3"), None]);
    }

    #[test]
    fn records_with_reordered_keys_are_rejected() {
        let err = RowBatch::from_records(vec![
            vec![("a".into(), s("1")), ("b".into(), s("2"))],
            vec![("b".into(), s("3")), ("a".into(), s("4"))],
        ])
        .unwrap_err();
        assert!(matches!(err, IngestError::RecordKeys { record: 2, .. }));
    }

    #[test]
    fn json_keeps_key_order_and_converts_scalars() {
        let batch =
            RowBatch::from_json(r#"[{"zeta": 1.5, "alpha": "x"}, {"zeta": null, "alpha": true}]"#)
                .expect("batch");
        assert_eq!(batch.columns(), ["zeta".to_string(), "alpha".to_string()]);
        assert_eq!(batch.rows()[0], vec![s("1.5"), s("x")]);
        assert_eq!(batch.rows()[1], vec![None, s("true")]);
    }

    #[test]
    fn json_must_be_an_array_of_objects() {
        assert!(matches!(
            RowBatch::from_json(r#"{"a": 1}"#),
            Err(IngestError::NotRecords { .. })
        ));
        assert!(matches!(
            RowBatch::from_json(r#"[{"a": 1}, 2]"#),
            Err(IngestError::NotRecords { .. })
        ));
        assert!(matches!(
            RowBatch::from_json("[{"),
            Err(IngestError::InvalidJson { .. })
        ));
    }

    #[test]
    fn empty_records_make_an_empty_batch() {
        let batch = RowBatch::from_records(Vec::new()).expect("batch");
        assert!(batch.is_empty());
        assert!(batch.columns().is_empty());
    }
}
