use bitcoin::BlockHash;
use serde::{Deserialize, Serialize};

use crate::Height;

/// `(height, hash, prev_hash)` plus whatever extra header fields callers need.
/// Ordered along the best chain; forks are resolved by the chain view against
/// a [`Locator`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChainedHeader {
    pub height: Height,
    pub hash: BlockHash,
    pub prev_hash: BlockHash,
    /// Block timestamp, as recorded in the header.
    pub time: u32,
}

impl ChainedHeader {
    pub fn new(height: Height, hash: BlockHash, prev_hash: BlockHash, time: u32) -> Self {
        Self {
            height,
            hash,
            prev_hash,
            time,
        }
    }
}

/// A compact, exponentially thinning list of block hashes from a tip backward,
/// used to locate the most recent common ancestor with the current chain.
///
/// Entries are ordered tip-first. Stride between consecutive entries doubles
/// after the first 10, matching the convention used by Bitcoin-family chain
/// clients: this is the only construction that lets `find_fork` give a useful
/// answer against an arbitrarily deep reorg without walking the whole chain.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Locator {
    /// Hashes from tip backward, most recent first.
    pub hashes: Vec<BlockHash>,
    /// Height of `hashes[0]`, i.e. the locator's tip.
    pub tip_height: Height,
}

impl Locator {
    /// Builds a locator by walking `tip` backward through `parent_of`, which
    /// returns the `(height, hash)` of the header preceding the given height,
    /// or `None` at genesis.
    pub fn build(tip: ChainedHeader, mut header_at: impl FnMut(Height) -> Option<BlockHash>) -> Self {
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

            match header_at(height) {
                Some(hash) => hashes.push(hash),
                None => break,
            }

            collected += 1;
            if collected > 10 {
                step *= 2;
            }
        }

        Self {
            hashes,
            tip_height: tip.height,
        }
    }

    /// A locator with a single entry, used when `ignore_checkpoints` forces a
    /// synthetic starting point at a configured height rather than one loaded
    /// from storage.
    pub fn synthetic(height: Height, hash: BlockHash) -> Self {
        Self {
            hashes: vec![hash],
            tip_height: height,
        }
    }

    pub fn tip_hash(&self) -> BlockHash {
        self.hashes[0]
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn hash(n: u8) -> BlockHash {
        let mut bytes = [0u8; 32];
        bytes[0] = n;
        BlockHash::from_str(&hex::encode(bytes)).unwrap()
    }

    #[test]
    fn build_doubles_stride_after_ten_entries() {
        // A 40-height chain; header_at(h) just returns hash(h as u8).
        let tip = ChainedHeader::new(40, hash(40), hash(39), 0);
        let locator = Locator::build(tip, |h| Some(hash(h as u8)));

        // First ten steps go down by 1 each (heights 40..=30), then stride
        // doubles: 28, 24, 16, 0.
        let heights: Vec<u64> = locator
            .hashes
            .iter()
            .map(|h| {
                // reverse-engineer height from our synthetic hash scheme
                let bytes = h.as_ref() as &[u8];
                bytes[0] as u64
            })
            .collect();
        assert_eq!(heights[0], 40);
        assert_eq!(heights.last().copied(), Some(0));
        assert!(heights.windows(2).all(|w| w[0] > w[1] || w[1] == 0));
    }

    #[test]
    fn synthetic_locator_has_single_entry() {
        let loc = Locator::synthetic(500, hash(5));
        assert_eq!(loc.hashes.len(), 1);
        assert_eq!(loc.tip_height, 500);
        assert_eq!(loc.tip_hash(), hash(5));
    }

    #[test]
    fn serialize_round_trip_is_fixed_point() {
        let loc = Locator::synthetic(10, hash(1));
        let ser1 = serde_json::to_string(&loc).unwrap();
        let de: Locator = serde_json::from_str(&ser1).unwrap();
        let ser2 = serde_json::to_string(&de).unwrap();
        assert_eq!(ser1, ser2);
    }
}
