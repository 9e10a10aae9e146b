use async_trait::async_trait;

use crate::{entity::TableRow, errors::DbError};

/// A row-key range for a chronological scan within one partition, as both
/// endpoints inclusive; `None` means unbounded on that side.
#[derive(Clone, Debug, Default)]
pub struct RowRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl RowRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn from_start(start: impl Into<String>) -> Self {
        Self {
            start: Some(start.into()),
            end: None,
        }
    }
}

/// The remote, partitioned key/value table store this indexer projects into.
/// Implementations must support atomic multi-row upserts within a single
/// partition and "replace unconditionally" semantics (the writer is the sole
/// updater of its own rows, so no optimistic concurrency is needed).
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn create_table_if_absent(&self, table: &str) -> Result<(), DbError>;

    async fn delete_table(&self, table: &str) -> Result<(), DbError>;

    /// Upserts all `rows` into `table`. All rows must share `partition`;
    /// callers are responsible for grouping by partition before calling this,
    /// since only within-partition upserts are atomic.
    async fn bulk_upsert(
        &self,
        table: &str,
        partition: &str,
        rows: Vec<TableRow>,
    ) -> Result<(), DbError>;

    async fn get(&self, table: &str, partition: &str, row: &str)
        -> Result<Option<TableRow>, DbError>;

    async fn scan(
        &self,
        table: &str,
        partition: &str,
        range: RowRange,
    ) -> Result<Vec<TableRow>, DbError>;
}
