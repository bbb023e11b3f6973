//! Split descriptors and the identifiers they are keyed by.
//!
//! - `TablePath` — fully qualified identity of one logical source table.
//! - `SubtaskId` — stable id of one parallel reader instance.
//! - `SplitId` — opaque identity of one split, unique within a job.
//! - `SplitCursor` — source-specific position/range of a split.
//! - `SplitDescriptor` — immutable unit of work handed to a reader.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Fully qualified path of a logical source table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TablePath {
    /// Database (or keyspace / index namespace).
    pub database: String,
    /// Optional schema between database and table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Table (or collection / class) name.
    pub table: String,
}

impl TablePath {
    /// Creates a two-part path `database.table`.
    #[must_use]
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            schema: None,
            table: table.into(),
        }
    }

    /// Creates a three-part path `database.schema.table`.
    #[must_use]
    pub fn with_schema(
        database: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            schema: Some(schema.into()),
            table: table.into(),
        }
    }
}

impl fmt::Display for TablePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}.{}", self.database, schema, self.table),
            None => write!(f, "{}.{}", self.database, self.table),
        }
    }
}

impl FromStr for TablePath {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(ConfigError::Invalid(format!("invalid table path: '{s}'")));
        }
        match parts.as_slice() {
            [database, table] => Ok(Self::new(*database, *table)),
            [database, schema, table] => Ok(Self::with_schema(*database, *schema, *table)),
            _ => Err(ConfigError::Invalid(format!(
                "table path must have 2 or 3 parts: '{s}'"
            ))),
        }
    }
}

/// Stable identifier of one parallel reader instance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SubtaskId(pub u32);

impl SubtaskId {
    /// Returns the id as a `usize` index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SubtaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subtask-{}", self.0)
    }
}

/// Opaque identity of a split, unique within a job.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SplitId(pub String);

impl SplitId {
    /// Create a new split identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the inner string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SplitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SplitId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SplitId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Source-specific position of a split.
///
/// Each variant captures one common shape of work unit; sources whose
/// cursors fit none of them use [`SplitCursor::Generic`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SplitCursor {
    /// The whole table in one split.
    Full,
    /// Half-open `[start, end)` row or offset range.
    Range {
        /// First row/offset (inclusive).
        start: u64,
        /// Last row/offset (exclusive).
        end: u64,
    },
    /// One upstream partition or shard.
    Partition {
        /// Partition number.
        partition: u32,
    },
    /// Opaque key-value cursor.
    Generic {
        /// Connector-defined properties.
        properties: BTreeMap<String, String>,
    },
}

/// Immutable unit of work assignable to one reader.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SplitDescriptor {
    split_id: SplitId,
    table: TablePath,
    cursor: SplitCursor,
}

impl SplitDescriptor {
    /// Creates a split descriptor.
    #[must_use]
    pub fn new(split_id: impl Into<SplitId>, table: TablePath, cursor: SplitCursor) -> Self {
        Self {
            split_id: split_id.into(),
            table,
            cursor,
        }
    }

    /// The split's identity.
    #[must_use]
    pub fn split_id(&self) -> &SplitId {
        &self.split_id
    }

    /// The table this split was generated from.
    #[must_use]
    pub fn table(&self) -> &TablePath {
        &self.table
    }

    /// The split's source-specific cursor.
    #[must_use]
    pub fn cursor(&self) -> &SplitCursor {
        &self.cursor
    }
}

impl fmt::Display for SplitDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.split_id, self.table)
    }
}
