//! Adapters onto a local Bitcoin full node: a read-only JSON-RPC client, and
//! the `ChainView`/`BlockRepository` traits the indexing core depends on.

pub mod chain_view;
pub mod repository;
pub mod rpc;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_support;

pub use chain_view::{ChainView, RpcChainView};
pub use repository::{BlockRepository, RpcBlockRepository};
