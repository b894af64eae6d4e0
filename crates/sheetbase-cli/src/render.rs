use std::io::Write;

use arrow::{
    array::RecordBatch,
    util::display::{ArrayFormatter, FormatOptions},
};
use sheetbase_core::{BatchReport, FileOutcome, TableDescriptor};
use snafu::ResultExt;
use tabled::{
    builder::Builder,
    settings::{Style, object::Rows, style::LineText, width::MinWidth},
};

use crate::error::{CliResult, RenderSnafu, StdoutSnafu};

const LABEL_OFFSET: usize = 6;

pub fn render_table(label: &str, columns: &[String], rows: &[Vec<String>]) -> String {
    if columns.is_empty() {
        return String::new();
    }

    let min_width = LABEL_OFFSET + label.len() + 4;

    let mut builder = Builder::default();
    builder.push_record(columns);
    for row in rows {
        builder.push_record(row);
    }

    let mut table = builder.build();

    table.with(Style::rounded());
    table.with(MinWidth::new(min_width));
    table.with(LineText::new(label.to_string(), Rows::first()).offset(LABEL_OFFSET));
    // LineText re-estimates dimensions, so re-apply MinWidth afterwards.
    table.with(MinWidth::new(min_width));
    table.to_string()
}

/// Column names plus the first `max_rows` rows of `batch` as display text.
/// Nulls render as empty cells.
pub fn batch_rows(batch: &RecordBatch, max_rows: usize) -> CliResult<(Vec<String>, Vec<Vec<String>>)> {
    let schema = batch.schema();
    let columns: Vec<String> = schema.fields().iter().map(|f| f.name().clone()).collect();

    let options = FormatOptions::default().with_null("");
    let formatters = batch
        .columns()
        .iter()
        .map(|array| ArrayFormatter::try_new(array.as_ref(), &options))
        .collect::<Result<Vec<_>, _>>()
        .context(RenderSnafu)?;

    let shown = batch.num_rows().min(max_rows);
    let rows = (0..shown)
        .map(|row| formatters.iter().map(|f| f.value(row).to_string()).collect())
        .collect();
    Ok((columns, rows))
}

pub fn write_batch<W: Write>(
    label: &str,
    batch: &RecordBatch,
    max_rows: usize,
    out: &mut W,
) -> CliResult<()> {
    let (columns, rows) = batch_rows(batch, max_rows)?;
    if !rows.is_empty() || max_rows == 0 {
        writeln!(out, "{}", render_table(label, &columns, &rows)).context(StdoutSnafu)?;
    }

    if batch.num_rows() == 0 {
        writeln!(out, "(no rows)").context(StdoutSnafu)?;
    } else if batch.num_rows() > rows.len() {
        writeln!(
            out,
            "(showing {} of {} rows; use --max-rows to see more)",
            rows.len(),
            batch.num_rows()
        )
        .context(StdoutSnafu)?;
    }
    writeln!(out, "total_rows: {}", batch.num_rows()).context(StdoutSnafu)?;
    Ok(())
}

pub fn write_tables<W: Write>(tables: &[TableDescriptor], out: &mut W) -> CliResult<()> {
    if tables.is_empty() {
        writeln!(out, "(no tables)").context(StdoutSnafu)?;
        return Ok(());
    }

    let columns = ["id", "name", "display_name", "owner", "columns", "created_at", "deleted"]
        .map(String::from)
        .to_vec();
    let rows: Vec<Vec<String>> = tables
        .iter()
        .map(|t| {
            vec![
                t.id.to_string(),
                t.logical_name.clone(),
                t.display_name.clone(),
                t.owner.to_string(),
                t.columns.join(", "),
                t.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                t.deleted.to_string(),
            ]
        })
        .collect();

    writeln!(out, "{}", render_table("Tables", &columns, &rows)).context(StdoutSnafu)?;
    Ok(())
}

pub fn write_report<W: Write>(report: &BatchReport, out: &mut W) -> CliResult<()> {
    let columns = ["file", "outcome", "rows", "detail"].map(String::from).to_vec();
    let rows: Vec<Vec<String>> = report
        .files
        .iter()
        .map(|f| match &f.outcome {
            FileOutcome::Ingested { rows } => vec![
                f.source.clone(),
                "ingested".to_string(),
                rows.to_string(),
                String::new(),
            ],
            FileOutcome::Failed { kind, reason } => vec![
                f.source.clone(),
                format!("failed ({kind})"),
                "0".to_string(),
                reason.clone(),
            ],
            FileOutcome::Skipped => vec![
                f.source.clone(),
                "skipped".to_string(),
                "0".to_string(),
                String::new(),
            ],
        })
        .collect();

    writeln!(out, "{}", render_table("Ingest report", &columns, &rows)).context(StdoutSnafu)?;
    writeln!(
        out,
        "table: {}  ingested: {}  failed: {}  skipped: {}  rows: {}",
        report.table,
        report.ingested(),
        report.failed(),
        report.skipped(),
        report.total_rows()
    )
    .context(StdoutSnafu)?;
    Ok(())
}
