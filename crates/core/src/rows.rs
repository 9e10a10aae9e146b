//! The four (plus one auxiliary) projected entity families, and the bucket
//! key derivation the balances/wallets/blocks/transactions partitions share.

use bitcoin::{Block, BlockHash, Transaction, Txid};
use idx_db::{rowkey, Entity};
use idx_primitives::Height;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

/// Whether a balance row reflects a best-chain-confirmed movement or a
/// mempool-only one. This core only ever processes confirmed blocks, so every
/// row it writes is `Confirmed`; `Unconfirmed` exists for API completeness and
/// future mempool-watching extensions.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfirmationInfo {
    Confirmed { height: Height },
    Unconfirmed,
}

/// 2-hex-char bucket derived from a hash's digest, giving 256 partitions.
fn bucket_of(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(&digest[0..1])
}

fn short_hash(hash: &BlockHash) -> String {
    hash.to_string()[0..12].to_string()
}

/// One row per block: header fields plus the ordered list of contained txids.
#[derive(Clone, Debug)]
pub struct BlockRow {
    pub hash: BlockHash,
    pub height: Height,
    pub prev_hash: BlockHash,
    pub time: u32,
    pub txids: Vec<Txid>,
}

impl BlockRow {
    pub fn from_block(height: Height, block: &Block) -> Self {
        Self {
            hash: block.block_hash(),
            height,
            prev_hash: block.header.prev_blockhash,
            time: block.header.time,
            txids: block.txdata.iter().map(|tx| tx.compute_txid()).collect(),
        }
    }
}

impl Entity for BlockRow {
    fn table_name() -> &'static str {
        "blocks"
    }

    fn partition_key(&self) -> String {
        bucket_of(self.hash.as_ref())
    }

    fn row_key(&self) -> String {
        self.hash.to_string()
    }

    fn properties(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("height".into(), json!(self.height));
        map.insert("prev_hash".into(), json!(self.prev_hash.to_string()));
        map.insert("time".into(), json!(self.time));
        map.insert(
            "txids".into(),
            json!(self.txids.iter().map(|t| t.to_string()).collect::<Vec<_>>()),
        );
        map
    }
}

/// One row per transaction, back-referencing its containing block and
/// position.
#[derive(Clone, Debug)]
pub struct TransactionRow {
    pub txid: Txid,
    pub block_hash: BlockHash,
    pub height: Height,
    pub tx_index: u32,
    pub raw_tx_hex: String,
}

impl TransactionRow {
    pub fn from_tx(height: Height, block_hash: BlockHash, tx_index: u32, tx: &Transaction) -> Self {
        Self {
            txid: tx.compute_txid(),
            block_hash,
            height,
            tx_index,
            raw_tx_hex: hex::encode(bitcoin::consensus::serialize(tx)),
        }
    }
}

impl Entity for TransactionRow {
    fn table_name() -> &'static str {
        "transactions"
    }

    fn partition_key(&self) -> String {
        bucket_of(self.txid.as_ref())
    }

    fn row_key(&self) -> String {
        self.txid.to_string()
    }

    fn properties(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("block_hash".into(), json!(self.block_hash.to_string()));
        map.insert("height".into(), json!(self.height));
        map.insert("tx_index".into(), json!(self.tx_index));
        map.insert("raw_tx_hex".into(), json!(self.raw_tx_hex));
        map
    }
}

/// A reference to a spent output, `(txid, vout)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutPointRef {
    pub txid: String,
    pub vout: u32,
}

/// One row per (address-or-script, tx) touching it. Partitioned by an
/// address/script bucket; row key encodes `(height, block-hash-prefix,
/// tx-index, change-index)` to preserve chronology and avoid collisions.
#[derive(Clone, Debug)]
pub struct OrderedBalanceChange {
    pub address_or_script: String,
    pub height: Height,
    pub block_hash: BlockHash,
    pub tx_index: u32,
    pub change_index: u32,
    pub received_sats: i64,
    pub sent_sats: i64,
    pub spent_outpoints: Vec<OutPointRef>,
    pub confirmation: ConfirmationInfo,
}

impl Entity for OrderedBalanceChange {
    fn table_name() -> &'static str {
        "balances"
    }

    fn partition_key(&self) -> String {
        bucket_of(self.address_or_script.as_bytes())
    }

    fn row_key(&self) -> String {
        rowkey::balance_row_key(
            self.height,
            &short_hash(&self.block_hash),
            self.tx_index,
            self.change_index,
        )
    }

    fn properties(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("address_or_script".into(), json!(self.address_or_script));
        map.insert("received_sats".into(), json!(self.received_sats));
        map.insert("sent_sats".into(), json!(self.sent_sats));
        map.insert("spent_outpoints".into(), json!(self.spent_outpoints));
        map.insert(
            "confirmation".into(),
            serde_json::to_value(self.confirmation).expect("confirmation info serializes"),
        );
        map
    }
}

/// Identical shape to [`OrderedBalanceChange`], but partitioned by the
/// wallet-rule id that matched instead of an address bucket. Produced only
/// when a wallet-rule set is configured and any of its rules matches.
#[derive(Clone, Debug)]
pub struct WalletBalanceChange {
    pub wallet_rule_id: String,
    pub inner: OrderedBalanceChange,
}

impl Entity for WalletBalanceChange {
    fn table_name() -> &'static str {
        "wallets"
    }

    fn partition_key(&self) -> String {
        self.wallet_rule_id.clone()
    }

    fn row_key(&self) -> String {
        self.inner.row_key()
    }

    fn properties(&self) -> Map<String, Value> {
        self.inner.properties()
    }
}

/// Optional auxiliary projection, enabled only when `index_smart_contracts`
/// is set. The historical field name had a typo (`CShartCode` vs
/// `CSharpCode`); this crate writes the corrected spelling and a reader must
/// accept either (see the smart-contract field-name decision in DESIGN.md).
#[derive(Clone, Debug)]
pub struct SmartContractDetail {
    pub contract_entry_id: String,
    pub bytecode_hex: String,
}

impl Entity for SmartContractDetail {
    fn table_name() -> &'static str {
        "smartcontracts"
    }

    fn partition_key(&self) -> String {
        "SmartContract".to_string()
    }

    fn row_key(&self) -> String {
        self.contract_entry_id.clone()
    }

    fn properties(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("CSharpCode".into(), json!(self.bytecode_hex));
        map
    }
}

impl SmartContractDetail {
    /// Reads back the payload field under either historical spelling.
    pub fn bytecode_hex_from_row(properties: &Map<String, Value>) -> Option<String> {
        properties
            .get("CSharpCode")
            .or_else(|| properties.get("CShartCode"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}

/// One row per accepted header in the chain-sync table, keyed by height.
#[derive(Clone, Debug)]
pub struct ChainRow {
    pub height: Height,
    pub hash: BlockHash,
    pub prev_hash: BlockHash,
}

impl Entity for ChainRow {
    fn table_name() -> &'static str {
        "chain"
    }

    fn partition_key(&self) -> String {
        // A single partition keeps the chain table trivially scannable in
        // height order; chain height is bounded by the node, not by this
        // table's partition-size limits.
        "chain".to_string()
    }

    fn row_key(&self) -> String {
        rowkey::chain_row_key(self.height)
    }

    fn properties(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("hash".into(), json!(self.hash.to_string()));
        map.insert("prev_hash".into(), json!(self.prev_hash.to_string()));
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;

    fn hash(n: u8) -> BlockHash {
        let mut bytes = [0u8; 32];
        bytes[0] = n;
        BlockHash::from_byte_array(bytes)
    }

    #[test]
    fn smart_contract_reads_both_spellings() {
        let mut new_style = Map::new();
        new_style.insert("CSharpCode".into(), json!("deadbeef"));
        assert_eq!(
            SmartContractDetail::bytecode_hex_from_row(&new_style),
            Some("deadbeef".to_string())
        );

        let mut old_style = Map::new();
        old_style.insert("CShartCode".into(), json!("cafef00d"));
        assert_eq!(
            SmartContractDetail::bytecode_hex_from_row(&old_style),
            Some("cafef00d".to_string())
        );
    }

    #[test]
    fn balance_row_key_orders_within_partition() {
        let base = OrderedBalanceChange {
            address_or_script: "addr1".into(),
            height: 10,
            block_hash: hash(1),
            tx_index: 0,
            change_index: 0,
            received_sats: 100,
            sent_sats: 0,
            spent_outpoints: vec![],
            confirmation: ConfirmationInfo::Confirmed { height: 10 },
        };
        let mut next = base.clone();
        next.change_index = 1;

        assert!(base.row_key() < next.row_key());
    }

    #[test]
    fn block_row_partition_is_stable_for_same_hash() {
        let block_hash = hash(7);
        let row = BlockRow {
            hash: block_hash,
            height: 7,
            prev_hash: hash(6),
            time: 0,
            txids: vec![],
        };
        assert_eq!(row.partition_key(), row.partition_key());
    }
}
