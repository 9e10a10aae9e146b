use bitcoin::BlockHash;
use chrono::{DateTime, Utc};
use idx_db::{Entity, TableRow};
use idx_primitives::{Locator, StreamKind};
use serde_json::{json, Map};

/// One stream's durable progress marker: a locator and the time it was saved.
/// Identified by a stream kind under a configured checkpoint set namespace.
/// Advances only forward in chain height; never rewound except by deleting
/// and restarting.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    pub kind: StreamKind,
    pub locator: Locator,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(kind: StreamKind, locator: Locator, saved_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            locator,
            saved_at,
        }
    }

    /// A checkpoint at height 0 anchored on `genesis_hash`, used the first
    /// time a stream runs.
    pub fn genesis(kind: StreamKind, genesis_hash: BlockHash, now: DateTime<Utc>) -> Self {
        Self::new(kind, Locator::synthetic(0, genesis_hash), now)
    }

    /// A synthetic checkpoint at `from_height`, used when `ignore_checkpoints`
    /// is set: processing starts at `from_height` regardless of any stored
    /// state, and this checkpoint is never itself persisted.
    pub fn synthetic(kind: StreamKind, from_height: u64, from_hash: BlockHash, now: DateTime<Utc>) -> Self {
        Self::new(kind, Locator::synthetic(from_height, from_hash), now)
    }

    pub fn height(&self) -> u64 {
        self.locator.tip_height
    }

    /// The row identity within the checkpoint table: `{checkpoint_set}/{kind}`.
    pub fn row_name(checkpoint_set: &str, kind: StreamKind) -> String {
        format!("{checkpoint_set}/{kind}")
    }
}

/// Wraps a [`Checkpoint`] with the partition (`checkpoint_set`) it's filed
/// under, so it can implement [`Entity`] without the set name floating around
/// as extra state.
pub struct CheckpointRow<'a> {
    pub checkpoint_set: &'a str,
    pub checkpoint: &'a Checkpoint,
}

impl Entity for CheckpointRow<'_> {
    fn table_name() -> &'static str {
        "checkpoints"
    }

    fn partition_key(&self) -> String {
        self.checkpoint_set.to_string()
    }

    fn row_key(&self) -> String {
        self.checkpoint.kind.as_str().to_string()
    }

    fn properties(&self) -> Map<String, serde_json::Value> {
        let locator_json =
            serde_json::to_string(&self.checkpoint.locator).expect("locator serializes");
        let mut map = Map::new();
        map.insert("locator".into(), json!(locator_json));
        map.insert(
            "saved_at".into(),
            json!(self.checkpoint.saved_at.to_rfc3339()),
        );
        map
    }
}

impl Checkpoint {
    /// Reconstructs a checkpoint from a stored row, for a given stream kind.
    pub fn from_row(kind: StreamKind, row: &TableRow) -> anyhow::Result<Self> {
        let locator_str = row
            .properties
            .get("locator")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("checkpoint row missing locator"))?;
        let locator: Locator = serde_json::from_str(locator_str)?;

        let saved_at_str = row
            .properties
            .get("saved_at")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("checkpoint row missing saved_at"))?;
        let saved_at = DateTime::parse_from_rfc3339(saved_at_str)?.with_timezone(&Utc);

        Ok(Checkpoint::new(kind, locator, saved_at))
    }
}
