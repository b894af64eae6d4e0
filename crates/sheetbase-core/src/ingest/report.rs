//! Multi-file ingestion policy and per-file outcome reports.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::{catalog::TableId, error::ErrorKind};

/// How a multi-file request treats a failing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    /// Commit each file on its own; stop at the first failure and skip the
    /// rest. Files committed before the failure stay committed.
    #[default]
    StopOnFirstError,
    /// Commit each file on its own and keep going after failures.
    BestEffort,
    /// One transaction for the whole request: any failure rolls back every
    /// file.
    AllOrNothing,
}

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// The file's rows were committed.
    Ingested {
        /// Rows appended.
        rows: u64,
    },
    /// The file was rejected; nothing from it was committed.
    Failed {
        /// Classification of the failure.
        kind: ErrorKind,
        /// Human-readable reason.
        reason: String,
    },
    /// The file was not attempted because an earlier one failed.
    Skipped,
}

/// One file's entry in a [`BatchReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    /// Source label (file name).
    pub source: String,
    /// Outcome.
    pub outcome: FileOutcome,
}

/// Result of a multi-file ingestion, one entry per input file in order.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Target table.
    pub table: TableId,
    /// Policy the request ran under.
    pub policy: BatchPolicy,
    /// Per-file outcomes.
    pub files: Vec<FileReport>,
    /// Total elapsed wall time in milliseconds.
    pub total_ms: u128,
}

impl BatchReport {
    /// Rows committed across all files.
    pub fn total_rows(&self) -> u64 {
        self.files
            .iter()
            .map(|f| match f.outcome {
                FileOutcome::Ingested { rows } => rows,
                _ => 0,
            })
            .sum()
    }

    /// Number of files whose rows were committed.
    pub fn ingested(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Ingested { .. }))
    }

    /// Number of rejected files.
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed { .. }))
    }

    /// Number of files not attempted.
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped))
    }

    /// Whether every file was ingested.
    pub fn is_complete(&self) -> bool {
        self.ingested() == self.files.len()
    }

    /// The first rejected file, if any.
    pub fn first_failure(&self) -> Option<&FileReport> {
        self.files
            .iter()
            .find(|f| matches!(f.outcome, FileOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.outcome)).count()
    }
}

/// Builder for batch reports.
#[derive(Debug)]
pub struct BatchReportBuilder {
    start: Instant,
    table: TableId,
    policy: BatchPolicy,
    files: Vec<FileReport>,
}

impl BatchReportBuilder {
    /// Start a report and its timer.
    pub fn new(table: TableId, policy: BatchPolicy) -> Self {
        Self {
            start: Instant::now(),
            table,
            policy,
            files: Vec::new(),
        }
    }

    /// Record the outcome for `source`.
    pub fn push(&mut self, source: impl Into<String>, outcome: FileOutcome) {
        self.files.push(FileReport {
            source: source.into(),
            outcome,
        });
    }

    /// Finalize the report.
    pub fn finish(self) -> BatchReport {
        BatchReport {
            table: self.table,
            policy: self.policy,
            files: self.files,
            total_ms: self.start.elapsed().as_millis(),
        }
    }
}
