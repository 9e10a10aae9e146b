//! Wallet-scoped balance changes: identical extraction to the balances
//! stream, filtered to the subset of scripts a configured wallet rule
//! watches, partitioned by the matching rule's id instead of a script
//! bucket. An empty rule set short-circuits the whole stream (see
//! `BlockProjector::should_skip_to_end`) rather than reading any blocks.

use std::collections::HashSet;

use bitcoin::Block;
use idx_db::{Entity, TableRow};
use idx_primitives::{Height, StreamKind};

use crate::rows::WalletBalanceChange;

use super::balances;
use super::BlockProjector;

/// A named predicate over addresses/scripts (hex-encoded `scriptPubkey`,
/// matching the encoding `balances::extract_from_tx` uses) that tags matching
/// balance changes into one logical wallet partition.
#[derive(Clone)]
pub struct WalletRule {
    pub id: String,
    pub scripts: HashSet<String>,
}

pub struct WalletsProjector {
    pub rules: Vec<WalletRule>,
}

impl WalletsProjector {
    fn matching_rule(&self, script: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| rule.scripts.contains(script))
            .map(|rule| rule.id.as_str())
    }
}

impl BlockProjector for WalletsProjector {
    fn stream_kind(&self) -> StreamKind {
        StreamKind::Wallets
    }

    fn should_skip_to_end(&self) -> bool {
        self.rules.is_empty()
    }

    fn project(&self, height: Height, block: &Block) -> Vec<(&'static str, TableRow)> {
        if self.rules.is_empty() {
            return Vec::new();
        }

        balances::extract_from_block(height, block)
            .into_iter()
            .filter_map(|change| {
                self.matching_rule(&change.address_or_script).map(|rule_id| {
                    let wrapped = WalletBalanceChange {
                        wallet_rule_id: rule_id.to_string(),
                        inner: change,
                    };
                    ("wallets", wrapped.to_row())
                })
            })
            .collect()
    }
}
