//! Core engine for runtime-defined tabular datasets.
//!
//! This crate provides the foundational pieces for `sheetbase`:
//!
//! - A typed schema builder that validates a requested column list before
//!   any DDL reaches the storage engine (`schema` module).
//! - A relational schema catalog recording each table's logical name,
//!   display name, owner, soft-delete flag and ordered columns (`catalog`).
//! - A dynamic table manager that registers a descriptor and materializes the
//!   physical table inside one transaction (`manager`).
//! - An ingestion pipeline that appends header-checked row batches,
//!   single or multi-file, under an explicit batch policy (`ingest`).
//! - A spreadsheet codec for the one accepted upload format (`spreadsheet`).
//! - An export façade that reads a dynamic table back into an Arrow
//!   `RecordBatch` for download or correlation (`export`).
//! - A pooled SQLite storage layer and TOML configuration (`storage`,
//!   `config`).
//!
//! Front ends (for example, the CLI) are expected to go through the
//! [`Sheetbase`] service rather than wiring the components by hand.
#![deny(missing_docs)]
pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod ingest;
pub mod manager;
pub mod schema;
pub mod service;
pub mod spreadsheet;
pub mod storage;

pub use catalog::{OwnerId, TableDescriptor, TableId};
pub use config::SheetbaseConfig;
pub use error::ErrorKind;
pub use export::ExportFormat;
pub use ingest::{BatchPolicy, BatchReport, FileOutcome, NamedBatch, RowBatch};
pub use manager::{CreateOutcome, DuplicatePolicy};
pub use schema::TableSpec;
pub use service::{Sheetbase, SheetbaseError};
pub use storage::StoragePool;
