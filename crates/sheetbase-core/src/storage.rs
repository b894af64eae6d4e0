//! Pooled access to the relational storage engine.
//!
//! This module centralizes everything that touches the connection pool:
//!
//! - Building a bounded SQLite pool from [`DatabaseSettings`] (pool size plus
//!   overflow ceiling, recycle interval, acquisition timeout, busy timeout).
//! - Handing out scoped sessions and transactions. A transaction that is
//!   dropped without [`commit`] rolls back, so every early return through `?`
//!   leaves the database untouched.
//! - Small SQL helpers shared by the catalog, the table manager and the
//!   ingestion pipeline (identifier quoting, unique-violation detection).
//!
//! The pool is created once by the caller and passed explicitly to each
//! component; there is no process-wide engine.

mod error;

use std::str::FromStr;

use log::debug;
use snafu::prelude::*;
use sqlx::{
    Sqlite, SqlitePool, Transaction,
    pool::PoolConnection,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};

pub use error::StorageError;
pub(crate) use error::{AcquireSnafu, CommitSnafu, QuerySnafu};
use error::{ConnectSnafu, InvalidUrlSnafu};

use crate::config::DatabaseSettings;

/// General result type used by storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// A pooled connection, returned to the pool on drop.
pub type Session = PoolConnection<Sqlite>;

/// An open transaction on a pooled connection; rolls back on drop.
pub type Tx = Transaction<'static, Sqlite>;

/// Shared handle to the connection pool. Cloning is cheap.
#[derive(Clone, Debug)]
pub struct StoragePool {
    pool: SqlitePool,
}

impl StoragePool {
    /// Build a pool from settings and open the first connection.
    ///
    /// The database file is created if it does not exist yet.
    pub async fn connect(settings: &DatabaseSettings) -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str(&settings.url)
            .context(InvalidUrlSnafu {
                url: settings.url.clone(),
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(settings.busy_timeout());

        let max_connections = settings.max_connections();
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(settings.pool_size.min(max_connections))
            .max_lifetime(Some(settings.recycle_interval()))
            .acquire_timeout(settings.acquire_timeout())
            .connect_with(options)
            .await
            .context(ConnectSnafu {
                url: settings.url.clone(),
            })?;

        debug!(
            "opened storage pool at {} (max_connections={max_connections})",
            settings.url
        );
        Ok(Self { pool })
    }

    /// Acquire a pooled connection for reads that need no transaction.
    pub async fn session(&self) -> StorageResult<Session> {
        self.pool.acquire().await.context(AcquireSnafu)
    }

    /// Start a write transaction on a pooled connection.
    ///
    /// The write lock is taken up front (`BEGIN IMMEDIATE`), so concurrent
    /// writers queue on the busy timeout instead of failing when a read
    /// snapshot cannot be upgraded.
    pub async fn begin(&self) -> StorageResult<Tx> {
        self.pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .context(AcquireSnafu)
    }

    /// Number of connections currently open (idle or in use).
    pub fn size(&self) -> u32 {
        self.pool.size()
    }

    /// Close every connection and refuse new acquisitions.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Commit a transaction opened with [`StoragePool::begin`].
pub async fn commit(tx: Tx) -> StorageResult<()> {
    tx.commit().await.context(CommitSnafu)
}

/// Quote a SQL identifier, doubling embedded double quotes.
pub fn quote_identifier(name: &str) -> String {
    let escaped = name.replace('"', "\"\"");
    format!("\"{escaped}\"")
}

/// If `err` is a unique-constraint violation, return the engine's message
/// (which names the violated column).
pub(crate) fn unique_violation_message(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => Some(db.message().to_string()),
        _ => None,
    }
}
