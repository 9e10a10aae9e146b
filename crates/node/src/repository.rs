use async_trait::async_trait;
use bitcoin::{Block, BlockHash};

/// Fetches full blocks by hash from the node's block store. Implementations
/// must be callable from the projection tasks in parallel; any serialization
/// against the underlying store is the implementation's concern.
#[async_trait]
pub trait BlockRepository: Send + Sync {
    async fn get_block(&self, hash: BlockHash) -> anyhow::Result<Option<Block>>;
}

/// [`BlockRepository`] backed directly by RPC calls to a Bitcoin node.
pub struct RpcBlockRepository<C> {
    client: C,
}

impl<C> RpcBlockRepository<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C> BlockRepository for RpcBlockRepository<C>
where
    C: crate::rpc::BlockByHash,
{
    async fn get_block(&self, hash: BlockHash) -> anyhow::Result<Option<Block>> {
        self.client.block_by_hash(hash).await
    }
}
