//! Keeps the `chain` table in sync with the node's best chain, independent of
//! the four projection checkpoints. Runs on its own cadence: each tick, reads
//! the highest height already recorded in the chain table (by scanning its
//! single partition; row keys are zero-padded heights, so the lexicographic
//! max is the numeric max), then walks forward from there appending headers
//! until it catches up with the node's current tip. A failed tick is logged
//! and retried after `retry_delay`, without tearing down the loop.

use std::sync::Arc;

use idx_db::{RowRange, TableStore};
use idx_node::ChainView;
use idx_primitives::Height;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::bulk::BulkBuffer;
use crate::rows::ChainRow;
use crate::scheduler::WriteScheduler;

const CHAIN_TABLE: &str = "chain";
const CHAIN_PARTITION: &str = "chain";

pub struct ChainSyncLoopParams {
    pub poll_interval: std::time::Duration,
    pub retry_delay: std::time::Duration,
    pub batch_rows: usize,
}

/// Drives the `chain` table. Reads through `table_store` directly (to find
/// its own tip marker) and writes through `scheduler` (to share the same
/// worker pool and backoff policy as the projection streams).
pub struct ChainSyncLoop {
    chain_view: Arc<dyn ChainView>,
    table_store: Arc<dyn TableStore>,
    scheduler: Arc<WriteScheduler>,
    params: ChainSyncLoopParams,
}

impl ChainSyncLoop {
    pub fn new(
        chain_view: Arc<dyn ChainView>,
        table_store: Arc<dyn TableStore>,
        scheduler: Arc<WriteScheduler>,
        params: ChainSyncLoopParams,
    ) -> Self {
        Self {
            chain_view,
            table_store,
            scheduler,
            params,
        }
    }

    /// Runs until cancelled, ticking at `poll_interval`.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }

            match self.sync_once(&cancel).await {
                Ok(synced_to) => info!(synced_to, "chain sync tick complete"),
                Err(err) => {
                    error!(error = %err, "chain sync tick failed, retrying after delay");
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(self.params.retry_delay) => {}
                    }
                    continue;
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.params.poll_interval) => {}
            }
        }
    }

    /// One walk from the stored tip to the node's current tip. Returns the
    /// height synced to (unchanged if already caught up).
    async fn sync_once(&self, cancel: &CancellationToken) -> anyhow::Result<Height> {
        let mut cursor = match self.stored_tip().await? {
            Some(height) => height + 1,
            None => 0,
        };

        let tip = self.chain_view.tip().await?;
        let mut buffer = BulkBuffer::new(CHAIN_TABLE, self.params.batch_rows, self.params.batch_rows);
        let mut last_synced = cursor.saturating_sub(1);

        while cursor <= tip.height {
            if cancel.is_cancelled() {
                break;
            }
            let header = match self.chain_view.block_at(cursor).await? {
                Some(header) => header,
                None => break,
            };
            let row = ChainRow {
                height: cursor,
                hash: header.hash,
                prev_hash: header.prev_hash,
            };
            buffer.add(&self.scheduler, &row).await?;
            last_synced = cursor;
            cursor += 1;
        }

        buffer.flush_all(&self.scheduler).await?;
        Ok(last_synced)
    }

    async fn stored_tip(&self) -> anyhow::Result<Option<Height>> {
        let rows = self
            .table_store
            .scan(CHAIN_TABLE, CHAIN_PARTITION, RowRange::all())
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.row_key.parse::<Height>().ok())
            .max())
    }
}
