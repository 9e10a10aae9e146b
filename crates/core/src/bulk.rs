//! Accumulates projected rows per partition and flushes them to the write
//! scheduler once a partition or the whole buffer crosses a size threshold,
//! so writes land as the largest atomic groups the table store's partition
//! semantics allow instead of one row at a time.

use std::collections::HashMap;

use idx_db::{Entity, TableRow};

use crate::scheduler::{WriteGroup, WriteScheduler};

/// Buffers rows for a single table, grouped by partition key.
pub struct BulkBuffer {
    table: String,
    max_partition_rows: usize,
    max_total_rows: usize,
    partitions: HashMap<String, Vec<TableRow>>,
    total_rows: usize,
}

impl BulkBuffer {
    pub fn new(table: impl Into<String>, max_partition_rows: usize, max_total_rows: usize) -> Self {
        Self {
            table: table.into(),
            max_partition_rows: max_partition_rows.max(1),
            max_total_rows: max_total_rows.max(1),
            partitions: HashMap::new(),
            total_rows: 0,
        }
    }

    /// Buffers one entity, flushing the entities already in its partition (or
    /// everything, if the buffer has grown past `max_total_rows`) to
    /// `scheduler` first if needed to make room.
    pub async fn add<E: Entity>(
        &mut self,
        scheduler: &WriteScheduler,
        entity: &E,
    ) -> anyhow::Result<()> {
        self.add_row(scheduler, entity.to_row()).await
    }

    /// Buffers a pre-built row, flushing the row's partition first if it's
    /// already at `max_partition_rows`.
    pub async fn add_row(&mut self, scheduler: &WriteScheduler, row: TableRow) -> anyhow::Result<()> {
        let partition = row.partition_key.clone();

        let bucket = self.partitions.entry(partition.clone()).or_default();
        if bucket.len() >= self.max_partition_rows {
            let full = std::mem::take(bucket);
            self.total_rows -= full.len();
            scheduler
                .submit(WriteGroup {
                    table: self.table.clone(),
                    partition: partition.clone(),
                    rows: full,
                })
                .await?;
        }

        let bucket = self.partitions.get_mut(&partition).expect("just inserted");
        bucket.push(row);
        self.total_rows += 1;

        if self.total_rows >= self.max_total_rows {
            self.flush_all(scheduler).await?;
        }

        Ok(())
    }

    /// Flushes every non-empty partition to `scheduler`, regardless of size.
    /// Callers must call this at the end of a batch so a partial partition
    /// isn't left stranded in memory.
    pub async fn flush_all(&mut self, scheduler: &WriteScheduler) -> anyhow::Result<()> {
        for (partition, rows) in self.partitions.drain() {
            if rows.is_empty() {
                continue;
            }
            self.total_rows -= rows.len();
            scheduler
                .submit(WriteGroup {
                    table: self.table.clone(),
                    partition,
                    rows,
                })
                .await?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.total_rows == 0
    }
}
