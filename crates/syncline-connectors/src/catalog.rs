//! Catalog collaborator: which logical tables a source job reads.
//!
//! The enumerator receives the job's tables at construction. When a
//! [`TableCatalog`] that supports incremental discovery is attached,
//! `SplitEnumerator::run` polls it for tables that appeared later.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::DiscoveryError;
use crate::split::TablePath;

/// One column of a table schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Column name.
    pub name: String,
    /// Source type name (kept verbatim; not interpreted by the enumerator).
    pub data_type: String,
    /// Whether the column admits nulls.
    pub nullable: bool,
}

/// Schema of a catalog table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Columns in declaration order.
    pub columns: Vec<ColumnSchema>,
}

/// A table as described by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogTable {
    /// The table's identity.
    pub path: TablePath,
    /// The table's schema.
    pub schema: TableSchema,
    /// Approximate row count, when the source can report one.
    pub estimated_rows: Option<u64>,
}

impl CatalogTable {
    /// Creates a table entry with an empty schema and no row estimate.
    #[must_use]
    pub fn new(path: TablePath) -> Self {
        Self {
            path,
            schema: TableSchema::default(),
            estimated_rows: None,
        }
    }

    /// Sets the row estimate.
    #[must_use]
    pub fn with_estimated_rows(mut self, rows: u64) -> Self {
        self.estimated_rows = Some(rows);
        self
    }

    /// Sets the schema.
    #[must_use]
    pub fn with_schema(mut self, schema: TableSchema) -> Self {
        self.schema = schema;
        self
    }
}

/// Read-only view of the tables a source exposes.
#[async_trait]
pub trait TableCatalog: Send + Sync {
    /// Lists every table the job should read.
    async fn list_tables(&self) -> Result<Vec<CatalogTable>, DiscoveryError>;

    /// Whether tables may appear after the job started.
    fn supports_incremental_discovery(&self) -> bool {
        false
    }
}

/// In-memory catalog backed by a fixed (but extendable) table list.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    tables: Arc<RwLock<Vec<CatalogTable>>>,
    incremental: bool,
}

impl StaticCatalog {
    /// Creates a catalog over the given tables.
    #[must_use]
    pub fn new(tables: Vec<CatalogTable>) -> Self {
        Self {
            tables: Arc::new(RwLock::new(tables)),
            incremental: false,
        }
    }

    /// Marks the catalog as supporting incremental discovery.
    #[must_use]
    pub fn incremental(mut self) -> Self {
        self.incremental = true;
        self
    }

    /// Adds a table; visible to the next `list_tables` call. Clones share the list.
    pub fn add_table(&self, table: CatalogTable) {
        let mut tables = self.tables.write();
        if !tables.iter().any(|t| t.path == table.path) {
            tables.push(table);
        }
    }

    /// Snapshot of the current table list.
    #[must_use]
    pub fn tables(&self) -> Vec<CatalogTable> {
        self.tables.read().clone()
    }
}

#[async_trait]
impl TableCatalog for StaticCatalog {
    async fn list_tables(&self) -> Result<Vec<CatalogTable>, DiscoveryError> {
        Ok(self.tables())
    }

    fn supports_incremental_discovery(&self) -> bool {
        self.incremental
    }
}
