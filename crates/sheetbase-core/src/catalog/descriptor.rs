use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Surrogate identifier of a dynamic table, assigned by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(pub i64);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the principal that created a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub i64);

impl OwnerId {
    /// The sentinel owner used when no principal is given.
    pub const ROOT: OwnerId = OwnerId(0);
}

impl Default for OwnerId {
    fn default() -> Self {
        OwnerId::ROOT
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == OwnerId::ROOT {
            f.write_str("root")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Catalog record describing one dynamic table.
///
/// `columns` is fixed at creation and lists the user columns in physical
/// order; the implicit row identifier column is not included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Surrogate identifier.
    pub id: TableId,
    /// Unique logical name, also the physical table name.
    pub logical_name: String,
    /// Unique human-readable label.
    pub display_name: String,
    /// Creating principal.
    pub owner: OwnerId,
    /// Ordered user column names.
    pub columns: Vec<String>,
    /// Soft-delete marker.
    pub deleted: bool,
    /// When the descriptor was registered.
    pub created_at: DateTime<Utc>,
}

impl TableDescriptor {
    /// Whether the descriptor is visible to regular listings and ingestion.
    pub fn is_live(&self) -> bool {
        !self.deleted
    }

    /// Position of `column` within the recorded column list.
    pub fn column_position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}
