use snafu::{Backtrace, prelude::*};

/// Errors that can occur while talking to the storage engine.
///
/// Every variant wraps the engine error with the operation that was being
/// attempted, so higher layers can report a generic failure externally while
/// keeping the detail in logs.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// The connection URL could not be parsed into connect options.
    #[snafu(display("Invalid database URL {url}: {source}"))]
    InvalidUrl {
        /// The URL as configured.
        url: String,
        /// Underlying engine error.
        source: sqlx::Error,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// The pool could not establish its connections.
    #[snafu(display("Failed to connect to {url}: {source}"))]
    Connect {
        /// The URL as configured.
        url: String,
        /// Underlying engine error.
        source: sqlx::Error,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// No pooled connection became available before the acquisition timeout,
    /// or a transaction could not be started.
    #[snafu(display("Failed to acquire a storage session: {source}"))]
    Acquire {
        /// Underlying engine error.
        source: sqlx::Error,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// A statement failed.
    #[snafu(display("Storage operation '{operation}' failed: {source}"))]
    Query {
        /// Short description of the statement (for example `create table survey`).
        operation: String,
        /// Underlying engine error.
        source: sqlx::Error,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// A transaction could not be committed.
    #[snafu(display("Failed to commit transaction: {source}"))]
    Commit {
        /// Underlying engine error.
        source: sqlx::Error,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },
}
