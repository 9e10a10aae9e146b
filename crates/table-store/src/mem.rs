use std::{
    collections::{BTreeMap, HashMap},
    sync::Mutex,
};

use async_trait::async_trait;
use idx_db::{DbError, RowRange, TableRow, TableStore};

/// In-memory [`TableStore`] used by tests and local development: replace
/// semantics, scans ordered by row key, no network involved.
#[derive(Default)]
pub struct MemTableStore {
    tables: Mutex<HashMap<String, BTreeMap<(String, String), TableRow>>>,
}

impl MemTableStore {
    pub fn new() -> Self {
        Self::default()
    }
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
        partition: &str,
        rows: Vec<TableRow>,
    ) -> Result<(), DbError> {
        if rows.iter().any(|r| r.partition_key != partition) {
            return Err(DbError::Other(
                "bulk_upsert: rows spanning multiple partitions".into(),
            ));
        }
        let mut tables = self.tables.lock().unwrap();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| DbError::NoSuchTable(table.to_string()))?;
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
        range: RowRange,
    ) -> Result<Vec<TableRow>, DbError> {
        let tables = self.tables.lock().unwrap();
        let Some(t) = tables.get(table) else {
            return Ok(Vec::new());
        };
        Ok(t.iter()
            .filter(|((p, r), _)| {
                let above_start = match &range.start {
                    Some(s) => r >= s,
                    None => true,
                };
                let below_end = match &range.end {
                    Some(e) => r <= e,
                    None => true,
                };
                p == partition && above_start && below_end
            })
            .map(|(_, row)| row.clone())
            .collect())
    }
}
