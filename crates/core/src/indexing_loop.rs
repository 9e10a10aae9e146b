//! Drives the four checkpointed streams to a configured `to_height`,
//! processing them sequentially within each batch (blocks, transactions,
//! balances, wallets) and tracking the aggregate store tip as the minimum
//! of their checkpoint heights. Batch failures other than cancellation are
//! logged and retried after a delay; cancellation exits cleanly.

use std::sync::Arc;
use std::time::Duration;

use bitcoin::BlockHash;
use idx_checkpoint::CheckpointStore;
use idx_node::{BlockRepository, ChainView};
use idx_primitives::{Height, StreamKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::projection::balances::BalancesProjector;
use crate::projection::blocks::BlocksProjector;
use crate::projection::transactions::TransactionsProjector;
use crate::projection::wallets::{WalletRule, WalletsProjector};
use crate::projection::{ProjectionTask, ProjectionTuning};
use crate::scheduler::WriteScheduler;

pub struct IndexingLoopParams {
    pub batch_size: u64,
    pub to_height: Height,
    pub retry_delay: Duration,
    pub checkpoint_interval: u64,
    pub max_partition_rows: usize,
    pub max_total_rows: usize,
    pub index_smart_contracts: bool,
    pub wallet_rules: Vec<WalletRule>,
}

pub struct IndexingLoop {
    checkpoint_store: Arc<CheckpointStore>,
    chain_view: Arc<dyn ChainView>,
    block_repository: Arc<dyn BlockRepository>,
    scheduler: Arc<WriteScheduler>,
    genesis_hash: BlockHash,
    from_hash: BlockHash,
    params: IndexingLoopParams,
}

impl IndexingLoop {
    pub fn new(
        checkpoint_store: Arc<CheckpointStore>,
        chain_view: Arc<dyn ChainView>,
        block_repository: Arc<dyn BlockRepository>,
        scheduler: Arc<WriteScheduler>,
        genesis_hash: BlockHash,
        from_hash: BlockHash,
        params: IndexingLoopParams,
    ) -> Self {
        Self {
            checkpoint_store,
            chain_view,
            block_repository,
            scheduler,
            genesis_hash,
            from_hash,
            params,
        }
    }

    /// Runs until every stream's checkpoint reaches `to_height`, or
    /// cancellation. Returns the final store tip.
    pub async fn run(&self, cancel: CancellationToken) -> anyhow::Result<Height> {
        loop {
            let tip = self.store_tip().await?;
            if cancel.is_cancelled() {
                info!(tip, "indexing loop cancelled");
                return Ok(tip);
            }
            if tip >= self.params.to_height {
                info!(tip, to = self.params.to_height, "indexing loop reached configured to_height");
                return Ok(tip);
            }

            match self.run_batch(&cancel).await {
                Ok(new_tip) => {
                    if new_tip >= self.params.to_height {
                        return Ok(new_tip);
                    }
                }
                Err(err) => {
                    error!(error = %err, "indexing batch failed, retrying after backoff");
                    tokio::select! {
                        _ = cancel.cancelled() => return self.store_tip().await,
                        _ = tokio::time::sleep(self.params.retry_delay) => {}
                    }
                }
            }
        }
    }

    async fn store_tip(&self) -> anyhow::Result<Height> {
        let mut min_height = Height::MAX;
        for kind in StreamKind::ALL {
            let checkpoint = self
                .checkpoint_store
                .load(kind, self.genesis_hash, self.from_hash)
                .await?;
            min_height = min_height.min(checkpoint.height());
        }
        Ok(min_height)
    }

    async fn run_batch(&self, cancel: &CancellationToken) -> anyhow::Result<Height> {
        let store_tip = self.store_tip().await?;
        let batch_ceiling = store_tip
            .saturating_add(self.params.batch_size)
            .min(self.params.to_height);

        for kind in StreamKind::ALL {
            if cancel.is_cancelled() {
                break;
            }
            let checkpoint = self
                .checkpoint_store
                .load(kind, self.genesis_hash, self.from_hash)
                .await?;
            if batch_ceiling <= checkpoint.height() {
                continue;
            }
            self.run_stream(kind, batch_ceiling, cancel).await?;
        }

        self.store_tip().await
    }

    async fn run_stream(
        &self,
        kind: StreamKind,
        to_height: Height,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        let tuning = ProjectionTuning {
            batch_size: self.params.batch_size,
            checkpoint_interval: self.params.checkpoint_interval,
            max_partition_rows: self.params.max_partition_rows,
            max_total_rows: self.params.max_total_rows,
        };

        match kind {
            StreamKind::Blocks => {
                ProjectionTask::new(
                    BlocksProjector,
                    self.checkpoint_store.clone(),
                    self.chain_view.clone(),
                    self.block_repository.clone(),
                    self.scheduler.clone(),
                    self.genesis_hash,
                    self.from_hash,
                    Some(to_height),
                    tuning,
                )
                .run(cancel.clone())
                .await?;
            }
            StreamKind::Transactions => {
                ProjectionTask::new(
                    TransactionsProjector {
                        index_smart_contracts: self.params.index_smart_contracts,
                    },
                    self.checkpoint_store.clone(),
                    self.chain_view.clone(),
                    self.block_repository.clone(),
                    self.scheduler.clone(),
                    self.genesis_hash,
                    self.from_hash,
                    Some(to_height),
                    tuning,
                )
                .run(cancel.clone())
                .await?;
            }
            StreamKind::Balances => {
                ProjectionTask::new(
                    BalancesProjector,
                    self.checkpoint_store.clone(),
                    self.chain_view.clone(),
                    self.block_repository.clone(),
                    self.scheduler.clone(),
                    self.genesis_hash,
                    self.from_hash,
                    Some(to_height),
                    tuning,
                )
                .run(cancel.clone())
                .await?;
            }
            StreamKind::Wallets => {
                ProjectionTask::new(
                    WalletsProjector {
                        rules: self.params.wallet_rules.clone(),
                    },
                    self.checkpoint_store.clone(),
                    self.chain_view.clone(),
                    self.block_repository.clone(),
                    self.scheduler.clone(),
                    self.genesis_hash,
                    self.from_hash,
                    Some(to_height),
                    tuning,
                )
                .run(cancel.clone())
                .await?;
            }
        }
        Ok(())
    }
}
