//! Shared fixtures for integration tests.
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;

use rust_xlsxwriter::Workbook;
use sheetbase_core::{
    Sheetbase, StoragePool,
    config::{DatabaseSettings, IngestSettings},
};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Small pool on a fresh database file under `dir`.
pub fn settings(dir: &Path) -> DatabaseSettings {
    let mut settings = DatabaseSettings::for_path(dir.join("sheetbase.db"));
    settings.pool_size = 2;
    settings.max_overflow = 4;
    settings.connect_timeout_secs = 10;
    settings
}

pub async fn open_pool(dir: &Path) -> StoragePool {
    StoragePool::connect(&settings(dir)).await.expect("pool")
}

pub async fn open_service(dir: &Path) -> Sheetbase {
    open_service_with(dir, IngestSettings::default()).await
}

pub async fn open_service_with(dir: &Path, ingest: IngestSettings) -> Sheetbase {
    Sheetbase::with_pool(open_pool(dir).await, ingest)
        .await
        .expect("service")
}

/// A single-sheet workbook with a header row and string cells; `None`
/// leaves the cell blank.
pub fn xlsx(header: &[&str], rows: &[Vec<Option<&str>>]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, name) in header.iter().enumerate() {
        sheet.write_string(0, col as u16, *name).expect("header");
    }
    for (r, row) in rows.iter().enumerate() {
        for (col, cell) in row.iter().enumerate() {
            if let Some(value) = cell {
                sheet
                    .write_string(r as u32 + 1, col as u16, *value)
                    .expect("cell");
            }
        }
    }
    workbook.save_to_buffer().expect("workbook")
}

/// A fully populated spreadsheet row.
pub fn row<'a>(values: &[&'a str]) -> Vec<Option<&'a str>> {
    values.iter().copied().map(Some).collect()
}
