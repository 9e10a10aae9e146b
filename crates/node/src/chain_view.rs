use async_trait::async_trait;
use idx_primitives::{ChainedHeader, Height, Locator};

/// Read-only view of the best chain as the host node currently sees it. Pure
/// in-memory over an externally maintained chain structure; must be safe to
/// query concurrently with whatever keeps it up to date (the chain-sync loop,
/// in this crate's case).
#[async_trait]
pub trait ChainView: Send + Sync {
    /// Walks `locator`'s entries in order; returns the first one present on
    /// the local chain, else the genesis header.
    async fn find_fork(&self, locator: &Locator) -> anyhow::Result<ChainedHeader>;

    /// The header at `height`, or `None` if the chain doesn't reach that far.
    async fn block_at(&self, height: Height) -> anyhow::Result<Option<ChainedHeader>>;

    /// The current tip header.
    async fn tip(&self) -> anyhow::Result<ChainedHeader>;
}

/// [`ChainView`] backed directly by RPC calls to a Bitcoin node, trading
/// round-trips for not needing a locally cached header chain.
pub struct RpcChainView<C> {
    client: C,
}

impl<C> RpcChainView<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C> ChainView for RpcChainView<C>
where
    C: crate::rpc::HeaderClient,
{
    async fn find_fork(&self, locator: &Locator) -> anyhow::Result<ChainedHeader> {
        for hash in &locator.hashes {
            if let Some(header) = self.client.header_by_hash(*hash).await? {
                return Ok(header);
            }
        }
        // Nothing in the locator resolved; fall back to genesis.
        self.block_at(0)
            .await?
            .ok_or_else(|| anyhow::anyhow!("chain view: genesis header unavailable"))
    }

    async fn block_at(&self, height: Height) -> anyhow::Result<Option<ChainedHeader>> {
        self.client.header_at_height(height).await
    }

    async fn tip(&self) -> anyhow::Result<ChainedHeader> {
        let tip_height = self.client.tip_height().await?;
        self.block_at(tip_height)
            .await?
            .ok_or_else(|| anyhow::anyhow!("chain view: reported tip height has no header"))
    }
}
