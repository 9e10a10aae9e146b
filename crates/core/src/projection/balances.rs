//! Extracts per-(address-or-script, tx) balance movements. Spend-side
//! amounts would require resolving each input's previous output, which needs
//! a UTXO index this core doesn't maintain (the block repository only
//! resolves whole blocks by hash, see `idx_node::BlockRepository`); spent
//! outpoints are recorded as references only, `sent_sats` always `0`. This
//! mirrors the "script" extraction described for the balances stream; the
//! wallets stream reuses it and filters by rule match.

use std::collections::HashMap;

use bitcoin::{Block, Transaction};
use idx_db::{Entity, TableRow};
use idx_primitives::{Height, StreamKind};

use crate::rows::{ConfirmationInfo, OrderedBalanceChange, OutPointRef};

use super::BlockProjector;

/// Builds the ordered balance changes for one transaction, one per distinct
/// output script, in first-appearance order (`change_index` is 0-based and
/// stable across replays since it only depends on `tx.output`'s order).
pub fn extract_from_tx(
    height: Height,
    block_hash: bitcoin::BlockHash,
    tx_index: u32,
    tx: &Transaction,
) -> Vec<OrderedBalanceChange> {
    let spent_outpoints: Vec<OutPointRef> = tx
        .input
        .iter()
        .map(|input| OutPointRef {
            txid: input.previous_output.txid.to_string(),
            vout: input.previous_output.vout,
        })
        .collect();

    let mut order: Vec<String> = Vec::new();
    let mut received: HashMap<String, i64> = HashMap::new();

    for output in &tx.output {
        let key = hex::encode(output.script_pubkey.as_bytes());
        if !received.contains_key(&key) {
            order.push(key.clone());
        }
        *received.entry(key).or_insert(0) += output.value.to_sat() as i64;
    }

    order
        .into_iter()
        .enumerate()
        .map(|(change_index, script)| OrderedBalanceChange {
            address_or_script: script.clone(),
            height,
            block_hash,
            tx_index,
            change_index: change_index as u32,
            received_sats: received[&script],
            sent_sats: 0,
            spent_outpoints: spent_outpoints.clone(),
            confirmation: ConfirmationInfo::Confirmed { height },
        })
        .collect()
}

pub fn extract_from_block(height: Height, block: &Block) -> Vec<OrderedBalanceChange> {
    let block_hash = block.block_hash();
    block
        .txdata
        .iter()
        .enumerate()
        .flat_map(|(tx_index, tx)| extract_from_tx(height, block_hash, tx_index as u32, tx))
        .collect()
}

#[derive(Default)]
pub struct BalancesProjector;

impl BlockProjector for BalancesProjector {
    fn stream_kind(&self) -> StreamKind {
        StreamKind::Balances
    }

    fn project(&self, height: Height, block: &Block) -> Vec<(&'static str, TableRow)> {
        extract_from_block(height, block)
            .into_iter()
            .map(|change| ("balances", change.to_row()))
            .collect()
    }
}
