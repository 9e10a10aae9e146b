use bitcoin::Block;
use idx_db::{Entity, TableRow};
use idx_primitives::{Height, StreamKind};

use crate::rows::TransactionRow;

use super::smartcontract;
use super::BlockProjector;

/// One row per transaction, back-referencing its containing block and
/// position. When `index_smart_contracts` is enabled, also emits an
/// auxiliary row into the smart-contract table for any transaction carrying
/// a contract deployment payload.
pub struct TransactionsProjector {
    pub index_smart_contracts: bool,
}

impl BlockProjector for TransactionsProjector {
    fn stream_kind(&self) -> StreamKind {
        StreamKind::Transactions
    }

    fn project(&self, height: Height, block: &Block) -> Vec<(&'static str, TableRow)> {
        let block_hash = block.block_hash();
        let mut rows = Vec::with_capacity(block.txdata.len());

        for (tx_index, tx) in block.txdata.iter().enumerate() {
            let row = TransactionRow::from_tx(height, block_hash, tx_index as u32, tx);
            rows.push(("transactions", row.to_row()));

            if self.index_smart_contracts {
                if let Some(detail) = smartcontract::detect(tx) {
                    rows.push(("smartcontracts", detail.to_row()));
                }
            }
        }

        rows
    }
}
