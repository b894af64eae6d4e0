//! Serializers for exported batches.

use std::fmt;

use arrow::array::RecordBatch;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    export::error::{ArrowSnafu, ExportError, SpreadsheetSnafu},
    spreadsheet::encode_xlsx,
};

/// Download formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// Single-sheet `.xlsx` workbook.
    #[default]
    Xlsx,
    /// Comma-separated values with a header line.
    Csv,
    /// One JSON object per line.
    Jsonl,
}

impl ExportFormat {
    /// Conventional file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Csv => "csv",
            ExportFormat::Jsonl => "jsonl",
        }
    }

    /// Media type for transports that label downloads.
    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ExportFormat::Csv => "text/csv",
            ExportFormat::Jsonl => "application/x-ndjson",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

enum OutputWriter {
    Csv(Box<arrow_csv::Writer<Vec<u8>>>),
    Jsonl(Box<arrow_json::LineDelimitedWriter<Vec<u8>>>),
}

impl OutputWriter {
    fn new(format: ExportFormat) -> Option<Self> {
        match format {
            ExportFormat::Csv => Some(OutputWriter::Csv(Box::new(
                arrow_csv::WriterBuilder::new().build(Vec::new()),
            ))),
            ExportFormat::Jsonl => Some(OutputWriter::Jsonl(Box::new(
                arrow_json::LineDelimitedWriter::new(Vec::new()),
            ))),
            ExportFormat::Xlsx => None,
        }
    }

    fn write_batch(&mut self, batch: &RecordBatch) -> Result<(), ExportError> {
        match self {
            OutputWriter::Csv(w) => w.write(batch).context(ArrowSnafu),
            OutputWriter::Jsonl(w) => w.write_batches(&[batch]).context(ArrowSnafu),
        }
    }

    fn finish(self) -> Result<Vec<u8>, ExportError> {
        match self {
            OutputWriter::Csv(w) => Ok(w.into_inner()),
            OutputWriter::Jsonl(mut w) => {
                w.finish().context(ArrowSnafu)?;
                Ok(w.into_inner())
            }
        }
    }
}

/// Serialize `batch` in `format`.
pub fn write_export(batch: &RecordBatch, format: ExportFormat) -> Result<Vec<u8>, ExportError> {
    match OutputWriter::new(format) {
        Some(mut writer) => {
            writer.write_batch(batch)?;
            writer.finish()
        }
        None => encode_xlsx(batch).context(SpreadsheetSnafu),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use std::sync::Arc;

    use arrow::{
        array::{Int64Array, StringArray},
        datatypes::{DataType, Field, Schema},
    };

    use super::*;

    fn sample() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec![Some("Ana"), None])),
            ],
        )
        .expect("batch")
    }

    #[test]
    fn csv_has_header_and_blank_nulls() {
        let bytes = write_export(&sample(), ExportFormat::Csv).expect("csv");
        let text = String::from_utf8(bytes).expect("utf8");
        assert_eq!(text, "id,name\n1,Ana\n2,\n");
    }

    #[test]
    fn jsonl_writes_one_object_per_row() {
        let bytes = write_export(&sample(), ExportFormat::Jsonl).expect("jsonl");
        let text = String::from_utf8(bytes).expect("utf8");
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).expect("json line"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["name"], "Ana");
        assert_eq!(lines[1]["id"], 2);
    }

    #[test]
    fn xlsx_output_is_a_zip_archive() {
        let bytes = write_export(&sample(), ExportFormat::Xlsx).expect("xlsx");
        assert!(bytes.starts_with(b"PK"));
    }
}
