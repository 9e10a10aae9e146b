//! In-memory `ChainView`/`BlockRepository` fakes for unit tests, following
//! the same "don't stand up a real node" shape as a mocked L1 client.

use std::collections::HashMap;

use async_trait::async_trait;
use bitcoin::{hashes::Hash, Block, BlockHash};
use idx_primitives::{ChainedHeader, Height, Locator};

use crate::{chain_view::ChainView, repository::BlockRepository};

/// A real serialized regtest block, reused across tests wherever a concrete
/// deserializable block is needed.
pub const TEST_BLOCKSTR: &str = "000000207d862a78fcb02ab24ebd154a20b9992af6d2f0c94d3a67b94ad5a0009d577e70769f3ff7452ea5dd469d7d99f200d083d020f1585e4bd9f52e9d66b23891a9c6c4ea5e66ffff7f200000000001020000000001010000000000000000000000000000000000000000000000000000000000000000ffffffff04025f0200ffffffff02205fa01200000000160014d7340213b180c97bd55fedd7312b7e17389cf9bf0000000000000000266a24aa21a9ede2f61c3f71d1defd3fa999dfa36953755c690689799962b48bebd836974e8cf90120000000000000000000000000000000000000000000000000000000000000000000000000";

pub fn test_block() -> Block {
    let bytes = hex::decode(TEST_BLOCKSTR).expect("valid test block hex");
    bitcoin::consensus::deserialize(&bytes).expect("valid test block encoding")
}

/// An in-memory chain, indexed by height, standing in for the node's local
/// best-chain view.
#[derive(Default)]
pub struct MemChainView {
    headers: Vec<ChainedHeader>,
}

impl MemChainView {
    pub fn new(headers: Vec<ChainedHeader>) -> Self {
        Self { headers }
    }
}

#[async_trait]
impl ChainView for MemChainView {
    async fn find_fork(&self, locator: &Locator) -> anyhow::Result<ChainedHeader> {
        for hash in &locator.hashes {
            if let Some(header) = self.headers.iter().find(|h| h.hash == *hash) {
                return Ok(*header);
            }
        }
        self.headers
            .first()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("empty chain"))
    }

    async fn block_at(&self, height: Height) -> anyhow::Result<Option<ChainedHeader>> {
        Ok(self.headers.get(height as usize).copied())
    }

    async fn tip(&self) -> anyhow::Result<ChainedHeader> {
        self.headers
            .last()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("empty chain"))
    }
}

/// An in-memory block store keyed by hash.
#[derive(Default)]
pub struct MemBlockRepository {
    blocks: HashMap<BlockHash, Block>,
}

impl MemBlockRepository {
    pub fn new(blocks: HashMap<BlockHash, Block>) -> Self {
        Self { blocks }
    }
}

#[async_trait]
impl BlockRepository for MemBlockRepository {
    async fn get_block(&self, hash: BlockHash) -> anyhow::Result<Option<Block>> {
        Ok(self.blocks.get(&hash).cloned())
    }
}
