//! Pulls confirmed blocks off the best chain for one stream, starting at the
//! fork point against its last checkpoint and stopping at the node's tip (or
//! a configured `to_height`). Periodically produces a checkpoint intent the
//! caller can persist once the corresponding rows have been written.

use std::sync::Arc;

use idx_checkpoint::Checkpoint;
use idx_node::{BlockRepository, ChainView};
use idx_primitives::{ChainedHeader, Height, Locator};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// A single fetched block at its confirmed height.
pub struct FetchedBlock {
    pub height: Height,
    pub block: bitcoin::Block,
}

/// The result of one [`BlockFetcher::next_batch`] call.
pub struct FetchBatch {
    pub blocks: Vec<FetchedBlock>,
    /// A locator the caller may persist as the stream's new checkpoint, once
    /// every row derived from `blocks` has been durably written.
    pub checkpoint_intent: Option<Locator>,
    /// True once the fetcher has caught up with the configured ceiling
    /// (node tip, or `to_height` if lower).
    pub reached_ceiling: bool,
}

/// Stateful cursor over the best chain for one stream. Not `Send`-shared;
/// each projection task owns one.
pub struct BlockFetcher {
    chain_view: Arc<dyn ChainView>,
    block_repository: Arc<dyn BlockRepository>,
    cursor: Height,
    to_height: Option<Height>,
    need_save_interval: u64,
    emitted_since_checkpoint: u64,
}

impl BlockFetcher {
    /// Resolves the fork point against `checkpoint`'s locator and positions
    /// the cursor just past it. A reorg below the checkpoint's recorded
    /// height surfaces as a cursor that starts earlier than expected; callers
    /// don't need to special-case it; re-fetched blocks simply overwrite
    /// previously written rows (invariant: row identity is idempotent).
    pub async fn new(
        chain_view: Arc<dyn ChainView>,
        block_repository: Arc<dyn BlockRepository>,
        checkpoint: &Checkpoint,
        to_height: Option<Height>,
        need_save_interval: u64,
    ) -> anyhow::Result<Self> {
        let fork = chain_view.find_fork(&checkpoint.locator).await?;
        if fork.height < checkpoint.height() {
            warn!(
                fork_height = fork.height,
                checkpoint_height = checkpoint.height(),
                "checkpointed locator did not resolve at its recorded height, rewinding to fork point"
            );
        }
        Ok(Self {
            chain_view,
            block_repository,
            cursor: fork.height + 1,
            to_height,
            need_save_interval: need_save_interval.max(1),
            emitted_since_checkpoint: 0,
        })
    }

    /// Fetches up to `batch_size` more blocks. Returns fewer than `batch_size`
    /// (possibly zero) when the ceiling is reached first.
    pub async fn next_batch(
        &mut self,
        batch_size: u64,
        cancel: &CancellationToken,
    ) -> anyhow::Result<FetchBatch> {
        let tip = self.chain_view.tip().await?;
        let ceiling = match self.to_height {
            Some(h) => h.min(tip.height),
            None => tip.height,
        };

        let mut blocks = Vec::new();
        let mut checkpoint_intent = None;
        let mut last_header: Option<ChainedHeader> = None;

        while (blocks.len() as u64) < batch_size && self.cursor <= ceiling {
            if cancel.is_cancelled() {
                break;
            }

            let header = match self.chain_view.block_at(self.cursor).await? {
                Some(header) => header,
                None => break,
            };

            match self.block_repository.get_block(header.hash).await? {
                Some(block) => {
                    blocks.push(FetchedBlock {
                        height: self.cursor,
                        block,
                    });
                    last_header = Some(header);
                    self.emitted_since_checkpoint += 1;
                    if self.emitted_since_checkpoint >= self.need_save_interval {
                        checkpoint_intent = Some(locator_at(&*self.chain_view, header).await?);
                        self.emitted_since_checkpoint = 0;
                    }
                }
                None => {
                    warn!(
                        height = self.cursor,
                        hash = %header.hash,
                        "block body unavailable on repository, skipping"
                    );
                }
            }

            self.cursor += 1;
        }

        let reached_ceiling = self.cursor > ceiling;
        if reached_ceiling && checkpoint_intent.is_none() {
            if let Some(header) = last_header {
                checkpoint_intent = Some(locator_at(&*self.chain_view, header).await?);
            }
        }

        Ok(FetchBatch {
            blocks,
            checkpoint_intent,
            reached_ceiling,
        })
    }
}

/// Async counterpart to [`idx_primitives::Locator::build`]: same stride
/// doubling, but resolving ancestors through a [`ChainView`] instead of a
/// synchronous callback. Also used by the wallets projection task to build a
/// checkpoint locator when short-circuiting straight to the ceiling.
pub(crate) async fn locator_at(chain_view: &dyn ChainView, tip: ChainedHeader) -> anyhow::Result<Locator> {
    let mut hashes = vec![tip.hash];
    let mut height = tip.height;
    let mut step: u64 = 1;
    let mut collected = 1usize;

    loop {
        if height == 0 {
            break;
        }
        let step_down = step.min(height);
        height -= step_down;

        match chain_view.block_at(height).await? {
            Some(header) => hashes.push(header.hash),
            None => break,
        }

        collected += 1;
        if collected > 10 {
            step *= 2;
        }
    }

    Ok(Locator {
        hashes,
        tip_height: tip.height,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use bitcoin::hashes::Hash;
    use bitcoin::BlockHash;
    use idx_node::test_support::{test_block, MemBlockRepository, MemChainView};
    use idx_primitives::StreamKind;

    use super::*;

    fn chain_of(n: u64) -> (Vec<ChainedHeader>, HashMap<BlockHash, bitcoin::Block>) {
        let base = test_block();
        let mut headers = Vec::new();
        let mut blocks = HashMap::new();
        let mut prev = BlockHash::all_zeros();
        for height in 0..n {
            let mut block = base.clone();
            block.header.prev_blockhash = prev;
            block.header.time = height as u32;
            let hash = {
                // vary the nonce per-height so hashes are distinct
                block.header.nonce = height as u32;
                block.block_hash()
            };
            headers.push(ChainedHeader::new(height, hash, prev, height as u32));
            blocks.insert(hash, block);
            prev = hash;
        }
        (headers, blocks)
    }

    #[tokio::test]
    async fn fetches_from_genesis_when_checkpoint_is_fresh() {
        let (headers, blocks) = chain_of(5);
        let genesis_hash = headers[0].hash;
        let chain_view: Arc<dyn ChainView> = Arc::new(MemChainView::new(headers));
        let repo: Arc<dyn BlockRepository> = Arc::new(MemBlockRepository::new(blocks));
        let checkpoint = Checkpoint::genesis(StreamKind::Blocks, genesis_hash, chrono::Utc::now());

        let mut fetcher = BlockFetcher::new(chain_view, repo, &checkpoint, None, 2)
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        let batch = fetcher.next_batch(10, &cancel).await.unwrap();

        assert_eq!(batch.blocks.len(), 4);
        assert_eq!(batch.blocks[0].height, 1);
        assert!(batch.reached_ceiling);
        assert!(batch.checkpoint_intent.is_some());
    }

    #[tokio::test]
    async fn respects_batch_size_across_multiple_calls() {
        let (headers, blocks) = chain_of(5);
        let genesis_hash = headers[0].hash;
        let chain_view: Arc<dyn ChainView> = Arc::new(MemChainView::new(headers));
        let repo: Arc<dyn BlockRepository> = Arc::new(MemBlockRepository::new(blocks));
        let checkpoint = Checkpoint::genesis(StreamKind::Blocks, genesis_hash, chrono::Utc::now());

        let mut fetcher = BlockFetcher::new(chain_view, repo, &checkpoint, None, 100)
            .await
            .unwrap();
        let cancel = CancellationToken::new();

        let first = fetcher.next_batch(2, &cancel).await.unwrap();
        assert_eq!(first.blocks.len(), 2);
        assert!(!first.reached_ceiling);

        let second = fetcher.next_batch(2, &cancel).await.unwrap();
        assert_eq!(second.blocks.len(), 2);

        let third = fetcher.next_batch(2, &cancel).await.unwrap();
        assert_eq!(third.blocks.len(), 0);
        assert!(third.reached_ceiling);
    }

    #[tokio::test]
    async fn to_height_bounds_the_ceiling_below_tip() {
        let (headers, blocks) = chain_of(10);
        let genesis_hash = headers[0].hash;
        let chain_view: Arc<dyn ChainView> = Arc::new(MemChainView::new(headers));
        let repo: Arc<dyn BlockRepository> = Arc::new(MemBlockRepository::new(blocks));
        let checkpoint = Checkpoint::genesis(StreamKind::Blocks, genesis_hash, chrono::Utc::now());

        let mut fetcher = BlockFetcher::new(chain_view, repo, &checkpoint, Some(3), 100)
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        let batch = fetcher.next_batch(100, &cancel).await.unwrap();

        assert_eq!(batch.blocks.len(), 3);
        assert_eq!(batch.blocks.last().unwrap().height, 3);
        assert!(batch.reached_ceiling);
    }

    #[tokio::test]
    async fn cancellation_stops_the_batch_early() {
        let (headers, blocks) = chain_of(5);
        let genesis_hash = headers[0].hash;
        let chain_view: Arc<dyn ChainView> = Arc::new(MemChainView::new(headers));
        let repo: Arc<dyn BlockRepository> = Arc::new(MemBlockRepository::new(blocks));
        let checkpoint = Checkpoint::genesis(StreamKind::Blocks, genesis_hash, chrono::Utc::now());

        let mut fetcher = BlockFetcher::new(chain_view, repo, &checkpoint, None, 100)
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let batch = fetcher.next_batch(10, &cancel).await.unwrap();
        assert_eq!(batch.blocks.len(), 0);
    }
}
