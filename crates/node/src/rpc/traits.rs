use async_trait::async_trait;
use bitcoin::{Block, BlockHash};
use idx_primitives::{ChainedHeader, Height};

/// Surface [`crate::chain_view::RpcChainView`] needs: resolve headers by
/// hash or height, and report the current tip height.
#[async_trait]
pub trait HeaderClient: Sync + Send + 'static {
    async fn header_by_hash(&self, hash: BlockHash) -> anyhow::Result<Option<ChainedHeader>>;

    async fn header_at_height(&self, height: Height) -> anyhow::Result<Option<ChainedHeader>>;

    async fn tip_height(&self) -> anyhow::Result<Height>;
}

/// Surface [`crate::repository::RpcBlockRepository`] needs.
#[async_trait]
pub trait BlockByHash: Sync + Send + 'static {
    async fn block_by_hash(&self, hash: BlockHash) -> anyhow::Result<Option<Block>>;
}
