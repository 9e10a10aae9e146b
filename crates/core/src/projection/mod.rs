//! The shared projection-task template: pull confirmed blocks from a
//! [`BlockFetcher`], turn each into rows via a [`BlockProjector`], buffer
//! them, and save a checkpoint once the rows backing it have been durably
//! acknowledged by the scheduler (a permanently failed write surfaces as an
//! `Err` out of the flush, so the checkpoint save is never reached for it).
//! One stream (blocks, transactions, balances, or wallets) runs one instance
//! of this template against its own checkpoint.

pub mod balances;
pub mod blocks;
pub mod smartcontract;
pub mod transactions;
pub mod wallets;

use std::collections::HashMap;
use std::sync::Arc;

use bitcoin::{Block, BlockHash};
use idx_checkpoint::{Checkpoint, CheckpointStore};
use idx_db::TableRow;
use idx_node::{BlockRepository, ChainView};
use idx_primitives::{Height, StreamKind};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::bulk::BulkBuffer;
use crate::fetcher::BlockFetcher;
use crate::scheduler::WriteScheduler;

/// Turns one confirmed block into the rows it contributes, each tagged with
/// the table it belongs in. A projector may write to more than one table
/// (balances projectors also feed the smart-contract table when enabled).
pub trait BlockProjector: Send + Sync {
    fn stream_kind(&self) -> StreamKind;

    fn project(&self, height: Height, block: &Block) -> Vec<(&'static str, TableRow)>;

    /// When true, the task advances its checkpoint straight to the ceiling
    /// without constructing a fetcher or reading any blocks. Used by the
    /// wallets stream when its rule set is empty.
    fn should_skip_to_end(&self) -> bool {
        false
    }
}

/// Tuning shared by every projection task; lifted straight from
/// [`idx_config::Config`] by the caller that wires the pipeline together.
#[derive(Clone, Copy)]
pub struct ProjectionTuning {
    pub batch_size: u64,
    pub checkpoint_interval: u64,
    pub max_partition_rows: usize,
    pub max_total_rows: usize,
}

pub struct ProjectionTask<P> {
    projector: P,
    checkpoint_store: Arc<CheckpointStore>,
    chain_view: Arc<dyn ChainView>,
    block_repository: Arc<dyn BlockRepository>,
    scheduler: Arc<WriteScheduler>,
    genesis_hash: BlockHash,
    from_hash: BlockHash,
    to_height: Option<Height>,
    tuning: ProjectionTuning,
}

impl<P: BlockProjector> ProjectionTask<P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        projector: P,
        checkpoint_store: Arc<CheckpointStore>,
        chain_view: Arc<dyn ChainView>,
        block_repository: Arc<dyn BlockRepository>,
        scheduler: Arc<WriteScheduler>,
        genesis_hash: BlockHash,
        from_hash: BlockHash,
        to_height: Option<Height>,
        tuning: ProjectionTuning,
    ) -> Self {
        Self {
            projector,
            checkpoint_store,
            chain_view,
            block_repository,
            scheduler,
            genesis_hash,
            from_hash,
            to_height,
            tuning,
        }
    }

    /// Runs until the chain tip (or configured `to_height`) is caught up
    /// with, or `cancel` fires. Returns the last height this task observed.
    pub async fn run(&self, cancel: CancellationToken) -> anyhow::Result<Height> {
        let kind = self.projector.stream_kind();

        if self.projector.should_skip_to_end() {
            return self.skip_to_end(kind).await;
        }

        let checkpoint = self
            .checkpoint_store
            .load(kind, self.genesis_hash, self.from_hash)
            .await?;
        let mut last_height = checkpoint.height();

        let mut fetcher = BlockFetcher::new(
            self.chain_view.clone(),
            self.block_repository.clone(),
            &checkpoint,
            self.to_height,
            self.tuning.checkpoint_interval,
        )
        .await?;

        let mut buffers: HashMap<&'static str, BulkBuffer> = HashMap::new();

        loop {
            if cancel.is_cancelled() {
                info!(%kind, "projection task cancelled");
                break;
            }

            let batch = fetcher.next_batch(self.tuning.batch_size, &cancel).await?;
            let had_blocks = !batch.blocks.is_empty();

            for fetched in &batch.blocks {
                for (table, row) in self.projector.project(fetched.height, &fetched.block) {
                    let buffer = buffers.entry(table).or_insert_with(|| {
                        BulkBuffer::new(
                            table,
                            self.tuning.max_partition_rows,
                            self.tuning.max_total_rows,
                        )
                    });
                    buffer.add_row(&self.scheduler, row).await?;
                }
                last_height = fetched.height;
            }

            if let Some(locator) = batch.checkpoint_intent {
                for buffer in buffers.values_mut() {
                    buffer.flush_all(&self.scheduler).await?;
                }
                let checkpoint = Checkpoint::new(kind, locator, chrono::Utc::now());
                self.checkpoint_store.save(&checkpoint).await?;
            }

            if batch.reached_ceiling && !had_blocks {
                break;
            }
        }

        Ok(last_height)
    }

    /// Advances the checkpoint directly to the ceiling (`to_height`, or the
    /// chain tip if unset) without reading any blocks.
    async fn skip_to_end(&self, kind: StreamKind) -> anyhow::Result<Height> {
        let tip = self.chain_view.tip().await?;
        let target_height = match self.to_height {
            Some(h) => h.min(tip.height),
            None => tip.height,
        };
        let header = match self.chain_view.block_at(target_height).await? {
            Some(header) => header,
            None => tip,
        };
        let locator = crate::fetcher::locator_at(&*self.chain_view, header).await?;
        let checkpoint = Checkpoint::new(kind, locator, chrono::Utc::now());
        self.checkpoint_store.save(&checkpoint).await?;
        Ok(target_height)
    }
}
