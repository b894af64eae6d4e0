//! Spreadsheet codec for the `.xlsx` upload and download format.
//!
//! Decoding reads the first worksheet: its first row is the header and every
//! following non-empty row is data. Cells are rendered to text the same way
//! regardless of how the spreadsheet typed them, so a table's columns stay
//! plain strings.
//!
//! Encoding writes an Arrow [`RecordBatch`] to a single `Sheet1` worksheet.

use std::{ffi::OsStr, io::Cursor, path::Path};

use arrow::{
    array::{Array, Int64Array, RecordBatch},
    error::ArrowError,
    util::display::{ArrayFormatter, FormatOptions},
};
use calamine::{Data, DataType, Reader, Xlsx, XlsxError, open_workbook_from_rs};
use log::debug;
use rust_xlsxwriter::Workbook;
use snafu::prelude::*;

use crate::{
    error::ErrorKind,
    ingest::{Cell, IngestError, RowBatch},
};

/// The only accepted file extension, without the dot.
pub const SPREADSHEET_EXTENSION: &str = "xlsx";

/// Worksheet name used for exports.
pub const SHEET_NAME: &str = "Sheet1";

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors from reading or writing spreadsheets.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SpreadsheetError {
    /// The file name does not carry the `.xlsx` extension.
    #[snafu(display("Unsupported file '{file_name}': only .xlsx spreadsheets are accepted"))]
    UnsupportedFormat {
        /// The offending file name.
        file_name: String,
    },

    /// The bytes are not a readable workbook.
    #[snafu(display("Failed to read spreadsheet: {source}"))]
    Read {
        /// Underlying reader error.
        source: XlsxError,
    },

    /// The workbook has no worksheet.
    #[snafu(display("Spreadsheet contains no worksheet"))]
    NoWorksheet,

    /// The first worksheet has no header row.
    #[snafu(display("Spreadsheet is empty: expected a header row"))]
    EmptySheet,

    /// A data cell sits under a blank header cell.
    #[snafu(display("Column {position} has values but no header"))]
    UnnamedColumn {
        /// One-based column position.
        position: usize,
    },

    /// The decoded grid could not be turned into a row batch.
    #[snafu(display("Invalid spreadsheet layout: {source}"))]
    Layout {
        /// Underlying batch error.
        #[snafu(source(from(IngestError, Box::new)))]
        source: Box<IngestError>,
    },

    /// The export has more rows or columns than a worksheet holds.
    #[snafu(display("Export does not fit in one worksheet: {what}"))]
    TooLarge {
        /// Which dimension overflowed.
        what: String,
    },

    /// Formatting an Arrow column for export failed.
    #[snafu(display("Failed to format column for export: {source}"))]
    Format {
        /// Underlying Arrow error.
        source: ArrowError,
    },

    /// The workbook could not be written.
    #[snafu(display("Failed to write spreadsheet: {source}"))]
    Write {
        /// Underlying writer error.
        source: rust_xlsxwriter::XlsxError,
    },
}

impl SpreadsheetError {
    /// Coarse classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SpreadsheetError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            SpreadsheetError::Read { .. }
            | SpreadsheetError::NoWorksheet
            | SpreadsheetError::EmptySheet
            | SpreadsheetError::UnnamedColumn { .. }
            | SpreadsheetError::Layout { .. } => ErrorKind::InvalidInput,
            SpreadsheetError::TooLarge { .. }
            | SpreadsheetError::Format { .. }
            | SpreadsheetError::Write { .. } => ErrorKind::Storage,
        }
    }
}

/// Reject any file name that is not `*.xlsx` (case-insensitive).
pub fn ensure_supported_extension(file_name: &str) -> Result<(), SpreadsheetError> {
    let supported = Path::new(file_name)
        .extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| ext.eq_ignore_ascii_case(SPREADSHEET_EXTENSION));
    ensure!(supported, UnsupportedFormatSnafu { file_name });
    Ok(())
}

/// Check the extension of `file_name`, then decode `bytes`.
pub fn decode_upload(file_name: &str, bytes: &[u8]) -> Result<RowBatch, SpreadsheetError> {
    ensure_supported_extension(file_name)?;
    let batch = decode_xlsx(bytes)?;
    debug!(
        "decoded {file_name}: {} columns, {} rows",
        batch.columns().len(),
        batch.len()
    );
    Ok(batch)
}

/// Decode the first worksheet of an `.xlsx` workbook.
pub fn decode_xlsx(bytes: &[u8]) -> Result<RowBatch, SpreadsheetError> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes)).context(ReadSnafu)?;
    let range = workbook
        .worksheet_range_at(0)
        .context(NoWorksheetSnafu)?
        .context(ReadSnafu)?;

    let mut rows = range.rows();
    let header_row = rows.next().context(EmptySheetSnafu)?;
    let header: Vec<String> = header_row
        .iter()
        .map(|c| render_cell(c).unwrap_or_default())
        .collect();

    // Trailing blank header cells come from formatted but unused columns.
    let width = header
        .iter()
        .rposition(|name| !name.is_empty())
        .map(|idx| idx + 1)
        .context(EmptySheetSnafu)?;
    let columns = header[..width].to_vec();

    let mut data = Vec::new();
    for row in rows {
        let cells: Vec<Cell> = row.iter().map(render_cell).collect();
        if cells.iter().all(Option::is_none) {
            continue;
        }
        if let Some(extra) = cells.iter().skip(width).position(Option::is_some) {
            return UnnamedColumnSnafu {
                position: width + extra + 1,
            }
            .fail();
        }
        let mut cells = cells;
        cells.resize(width, None);
        data.push(cells);
    }

    RowBatch::from_grid(columns, data).context(LayoutSnafu)
}

/// Render one cell as stored text; blank cells are `None`.
pub fn render_cell(cell: &Data) -> Cell {
    match cell {
        Data::Empty => None,
        Data::String(s) if s.is_empty() => None,
        Data::String(s) => Some(s.clone()),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) => Some(render_float(*f)),
        Data::Bool(b) => Some(b.to_string()),
        Data::DateTime(_) | Data::DateTimeIso(_) => Some(
            cell.as_datetime()
                .map(|dt| dt.format(DATETIME_FORMAT).to_string())
                .unwrap_or_else(|| cell.to_string()),
        ),
        other => Some(other.to_string()),
    }
}

fn render_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Encode `batch` as a single-sheet workbook.
///
/// The header row carries the field names. `Int64` columns are written as
/// numbers, everything else as text; nulls stay blank.
pub fn encode_xlsx(batch: &RecordBatch) -> Result<Vec<u8>, SpreadsheetError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME).context(WriteSnafu)?;

    let schema = batch.schema();
    let options = FormatOptions::default();

    for (col_idx, (field, array)) in schema.fields().iter().zip(batch.columns()).enumerate() {
        let col = u16::try_from(col_idx).ok().context(TooLargeSnafu {
            what: format!("{} columns", batch.num_columns()),
        })?;
        sheet.write_string(0, col, field.name()).context(WriteSnafu)?;

        let numbers = array.as_any().downcast_ref::<Int64Array>();
        let formatter = ArrayFormatter::try_new(array.as_ref(), &options).context(FormatSnafu)?;

        for row_idx in 0..batch.num_rows() {
            if array.is_null(row_idx) {
                continue;
            }
            let row = u32::try_from(row_idx + 1).ok().context(TooLargeSnafu {
                what: format!("{} rows", batch.num_rows()),
            })?;
            match numbers {
                Some(ints) => {
                    sheet
                        .write_number(row, col, ints.value(row_idx) as f64)
                        .context(WriteSnafu)?;
                }
                None => {
                    sheet
                        .write_string(row, col, formatter.value(row_idx).to_string())
                        .context(WriteSnafu)?;
                }
            }
        }
    }

    workbook.save_to_buffer().context(WriteSnafu)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use std::sync::Arc;

    use arrow::{
        array::StringArray,
        datatypes::{DataType as ArrowType, Field, Schema},
    };

    use super::*;

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(ensure_supported_extension("survey.xlsx").is_ok());
        assert!(ensure_supported_extension("SURVEY.XLSX").is_ok());
        for name in ["survey.csv", "survey.xls", "survey", "xlsx"] {
            let err = ensure_supported_extension(name).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnsupportedFormat, "{name}");
        }
    }

    #[test]
    fn cells_render_as_text() {
        assert_eq!(render_cell(&Data::Empty), None);
        assert_eq!(render_cell(&Data::String(String::new())), None);
        assert_eq!(render_cell(&Data::String("Ana".into())), Some("Ana".into()));
        assert_eq!(render_cell(&Data::Float(30.0)), Some("30".into()));
        assert_eq!(render_cell(&Data::Float(1.25)), Some("1.25".into()));
        assert_eq!(render_cell(&Data::Int(-4)), Some("-4".into()));
        assert_eq!(render_cell(&Data::Bool(true)), Some("true".into()));
    }

    #[test]
    fn garbage_bytes_are_invalid_input() {
        let err = decode_xlsx(b"definitely not a zip archive").unwrap_err();
        assert!(matches!(err, SpreadsheetError::Read { .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn encoded_workbook_decodes_back() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", ArrowType::Int64, false),
            Field::new("name", ArrowType::Utf8, true),
            Field::new("age", ArrowType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec![Some("Ana"), Some("Bo")])),
                Arc::new(StringArray::from(vec![Some("30"), None])),
            ],
        )
        .expect("batch");

        let bytes = encode_xlsx(&batch).expect("encode");
        let decoded = decode_xlsx(&bytes).expect("decode");

        assert_eq!(decoded.columns(), ["id", "name", "age"]);
        assert_eq!(
            decoded.rows(),
            [
                vec![Some("1".to_string()), Some("Ana".to_string()), Some("30".to_string())],
                vec![Some("2".to_string()), Some("Bo".to_string()), None],
            ]
        );
    }

    #[test]
    fn blank_rows_are_dropped_and_stray_cells_rejected() {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "name").unwrap();
        sheet.write_string(1, 0, "Ana").unwrap();
        sheet.write_string(3, 0, "Bo").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let decoded = decode_xlsx(&bytes).expect("decode");
        assert_eq!(decoded.len(), 2);

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "name").unwrap();
        sheet.write_string(1, 0, "Ana").unwrap();
        sheet.write_string(1, 2, "stray").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let err = decode_xlsx(&bytes).unwrap_err();
        assert!(matches!(err, SpreadsheetError::UnnamedColumn { position: 3 }));
    }
}
