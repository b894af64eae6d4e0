#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use rust_xlsxwriter::Workbook;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// The binary pointed at a fresh database under `dir`, with environment
/// overrides cleared.
pub fn cli(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("sheetbase"));
    cmd.env_remove("SHEETBASE_DATABASE_URL")
        .env_remove("SHEETBASE_LOG_LEVEL")
        .env("RUST_LOG", "warn")
        .arg("--database")
        .arg(dir.join("sheetbase.db"));
    cmd
}

/// Write a single-sheet workbook to `dir/name` and return its path.
pub fn write_xlsx(dir: &Path, name: &str, header: &[&str], rows: &[&[&str]]) -> PathBuf {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, value) in header.iter().enumerate() {
        sheet.write_string(0, col as u16, *value).expect("header");
    }
    for (r, row) in rows.iter().enumerate() {
        for (col, value) in row.iter().enumerate() {
            if !value.is_empty() {
                sheet
                    .write_string(r as u32 + 1, col as u16, *value)
                    .expect("cell");
            }
        }
    }

    let path = dir.join(name);
    workbook.save(&path).expect("save workbook");
    path
}
