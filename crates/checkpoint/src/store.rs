use std::sync::Arc;

use bitcoin::BlockHash;
use idx_db::{DbError, Entity, TableStore};
use idx_primitives::{Height, Locator, StreamKind};
use tracing::{info, warn};

use crate::model::{Checkpoint, CheckpointRow};

/// Loads and saves per-stream checkpoints in the shared table store under
/// `{checkpoint_set}/{kind}`. Reads are eventually consistent, but only the
/// owning stream ever writes a given row, so no cross-writer coordination is
/// needed.
pub struct CheckpointStore {
    table_store: Arc<dyn TableStore>,
    storage_namespace: String,
    checkpoint_set_name: String,
    ignore_checkpoints: bool,
    from_height: Height,
}

impl CheckpointStore {
    pub fn new(
        table_store: Arc<dyn TableStore>,
        storage_namespace: impl Into<String>,
        checkpoint_set_name: impl Into<String>,
        ignore_checkpoints: bool,
        from_height: Height,
    ) -> Self {
        Self {
            table_store,
            storage_namespace: storage_namespace.into(),
            checkpoint_set_name: checkpoint_set_name.into(),
            ignore_checkpoints,
            from_height,
        }
    }

    fn table_name(&self) -> String {
        format!("{}checkpoints", self.storage_namespace)
    }

    /// Ensures the checkpoint table exists.
    pub async fn init(&self) -> Result<(), DbError> {
        self.table_store
            .create_table_if_absent(&self.table_name())
            .await
    }

    /// Loads the checkpoint for `kind`. When `ignore_checkpoints` is set,
    /// returns a synthetic locator anchored at `from_height`/`from_hash`
    /// instead of reading the table.
    pub async fn load(
        &self,
        kind: StreamKind,
        genesis_hash: BlockHash,
        from_hash: BlockHash,
    ) -> Result<Checkpoint, DbError> {
        if self.ignore_checkpoints {
            info!(%kind, height = self.from_height, "ignoring stored checkpoint");
            return Ok(Checkpoint::synthetic(
                kind,
                self.from_height,
                from_hash,
                now(),
            ));
        }

        let row = self
            .table_store
            .get(
                &self.table_name(),
                &self.checkpoint_set_name,
                kind.as_str(),
            )
            .await?;

        match row {
            Some(row) => Checkpoint::from_row(kind, &row)
                .map_err(|e| DbError::Corrupt(self.table_name(), kind.as_str().into(), e.to_string())),
            None => {
                info!(%kind, "no stored checkpoint, starting from genesis");
                Ok(Checkpoint::genesis(kind, genesis_hash, now()))
            }
        }
    }

    /// Persists `checkpoint`. A no-op (but not an error) when
    /// `ignore_checkpoints` is set, since that mode never writes checkpoint
    /// rows back.
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<(), DbError> {
        if self.ignore_checkpoints {
            return Ok(());
        }

        let row = CheckpointRow {
            checkpoint_set: &self.checkpoint_set_name,
            checkpoint,
        }
        .to_row();

        match self
            .table_store
            .bulk_upsert(&self.table_name(), &self.checkpoint_set_name, vec![row])
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(kind = %checkpoint.kind, error = %e, "checkpoint save failed");
                Err(e)
            }
        }
    }

    /// Deletes and recreates the checkpoint table, for recovery from a
    /// corrupt table observed by the chain cache.
    pub async fn recreate(&self) -> Result<(), DbError> {
        self.table_store.delete_table(&self.table_name()).await?;
        self.table_store
            .create_table_if_absent(&self.table_name())
            .await
    }
}

fn now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use idx_db::{RowRange, TableRow};

    use super::*;

    #[derive(Default)]
    struct MemTableStore {
        tables: Mutex<HashMap<String, HashMap<(String, String), TableRow>>>,
    }

    #[async_trait]
    impl TableStore for MemTableStore {
        async fn create_table_if_absent(&self, table: &str) -> Result<(), DbError> {
            self.tables
                .lock()
                .unwrap()
                .entry(table.to_string())
                .or_default();
            Ok(())
        }

        async fn delete_table(&self, table: &str) -> Result<(), DbError> {
            self.tables.lock().unwrap().remove(table);
            Ok(())
        }

        async fn bulk_upsert(
            &self,
            table: &str,
            _partition: &str,
            rows: Vec<TableRow>,
        ) -> Result<(), DbError> {
            let mut tables = self.tables.lock().unwrap();
            let t = tables.entry(table.to_string()).or_default();
            for row in rows {
                t.insert((row.partition_key.clone(), row.row_key.clone()), row);
            }
            Ok(())
        }

        async fn get(
            &self,
            table: &str,
            partition: &str,
            row: &str,
        ) -> Result<Option<TableRow>, DbError> {
            Ok(self
                .tables
                .lock()
                .unwrap()
                .get(table)
                .and_then(|t| t.get(&(partition.to_string(), row.to_string())))
                .cloned())
        }

        async fn scan(
            &self,
            table: &str,
            partition: &str,
            _range: RowRange,
        ) -> Result<Vec<TableRow>, DbError> {
            Ok(self
                .tables
                .lock()
                .unwrap()
                .get(table)
                .map(|t| {
                    t.values()
                        .filter(|r| r.partition_key == partition)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }
    }

    fn hash(n: u8) -> BlockHash {
        use bitcoin::hashes::Hash;
        let mut bytes = [0u8; 32];
        bytes[0] = n;
        BlockHash::from_byte_array(bytes)
    }

    #[tokio::test]
    async fn load_returns_genesis_when_nothing_stored() {
        let store = CheckpointStore::new(
            Arc::new(MemTableStore::default()),
            "idx",
            "default",
            false,
            0,
        );
        store.init().await.unwrap();
        let cp = store
            .load(StreamKind::Blocks, hash(0), hash(0))
            .await
            .unwrap();
        assert_eq!(cp.height(), 0);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = CheckpointStore::new(
            Arc::new(MemTableStore::default()),
            "idx",
            "default",
            false,
            0,
        );
        store.init().await.unwrap();
        let cp = Checkpoint::new(StreamKind::Blocks, Locator::synthetic(42, hash(1)), now());
        store.save(&cp).await.unwrap();

        let loaded = store.load(StreamKind::Blocks, hash(0), hash(0)).await.unwrap();
        assert_eq!(loaded.height(), 42);
        assert_eq!(loaded.locator.tip_hash(), hash(1));
    }

    #[tokio::test]
    async fn ignore_checkpoints_short_circuits_to_synthetic_locator() {
        let table_store = Arc::new(MemTableStore::default());
        let store = CheckpointStore::new(table_store.clone(), "idx", "default", false, 0);
        store.init().await.unwrap();
        let existing = Checkpoint::new(StreamKind::Blocks, Locator::synthetic(500, hash(5)), now());
        store.save(&existing).await.unwrap();

        let store = CheckpointStore::new(table_store, "idx", "default", true, 200);
        let loaded = store
            .load(StreamKind::Blocks, hash(0), hash(9))
            .await
            .unwrap();
        assert_eq!(loaded.height(), 200);
        assert_eq!(loaded.locator.tip_hash(), hash(9));

        // ignore_checkpoints never persists new checkpoint rows
        store.save(&loaded).await.unwrap();
        let raw = table_store
            .get("idxcheckpoints", "default", "blocks")
            .await
            .unwrap()
            .unwrap();
        let reloaded = Checkpoint::from_row(StreamKind::Blocks, &raw).unwrap();
        assert_eq!(reloaded.height(), 500);
    }
}
