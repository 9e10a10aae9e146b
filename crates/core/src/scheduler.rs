//! Bounded worker pool that drains partitioned write groups into the table
//! store, retrying transient failures with backoff. `scheduler_ready` bounds
//! how many groups are in flight at once; `scheduler_queue_cap` bounds how
//! many more may wait behind them before `submit` starts applying
//! backpressure to the caller. `submit` resolves only once the worker that
//! picked up the group reports an outcome, so a permanently failed write
//! (retries exhausted) surfaces as an `Err` to the caller instead of only
//! being visible through the failure counter.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use idx_common::retry::{policies::ExponentialBackoff, retry_with_backoff_async};
use idx_db::{TableRow, TableStore};
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// All rows in a group share one partition, satisfying the table store's
/// atomicity requirement for `bulk_upsert`.
pub struct WriteGroup {
    pub table: String,
    pub partition: String,
    pub rows: Vec<TableRow>,
}

/// A queued group plus the channel its submitter is waiting on for the
/// write's outcome, once retries are exhausted one way or the other.
struct QueuedWrite {
    group: WriteGroup,
    result_tx: oneshot::Sender<anyhow::Result<()>>,
}

/// Handle to a running pool of write workers. Dropping the sender side (via
/// [`WriteScheduler::shutdown`]) lets workers drain the queue and exit.
pub struct WriteScheduler {
    sender: mpsc::Sender<QueuedWrite>,
    workers: Vec<JoinHandle<()>>,
    failures: Arc<AtomicU64>,
}

impl WriteScheduler {
    pub fn new(
        table_store: Arc<dyn TableStore>,
        worker_count: usize,
        queue_capacity: usize,
        backoff: ExponentialBackoff,
        max_retries: u16,
        cancel: CancellationToken,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let receiver = Arc::new(AsyncMutex::new(receiver));
        let failures = Arc::new(AtomicU64::new(0));

        let workers = (0..worker_count.max(1))
            .map(|id| {
                let receiver = receiver.clone();
                let table_store = table_store.clone();
                let cancel = cancel.clone();
                let failures = failures.clone();
                tokio::spawn(async move {
                    worker_loop(id, receiver, table_store, backoff, max_retries, cancel, failures).await;
                })
            })
            .collect();

        Self {
            sender,
            workers,
            failures,
        }
    }

    /// Enqueues `group`, waiting if the queue is at capacity, then waits for
    /// the worker that picks it up to report an outcome. Returns `Err` both
    /// when no worker is running to accept the group, and when the group's
    /// write permanently failed after exhausting retries — callers must
    /// treat either as the batch failing, not just the enqueue failing.
    pub async fn submit(&self, group: WriteGroup) -> anyhow::Result<()> {
        let (result_tx, result_rx) = oneshot::channel();
        self.sender
            .send(QueuedWrite { group, result_tx })
            .await
            .map_err(|_| anyhow::anyhow!("write scheduler has no running workers"))?;
        result_rx
            .await
            .map_err(|_| anyhow::anyhow!("write scheduler worker dropped without reporting a result"))?
    }

    /// Count of write groups that exhausted their retries and were dropped.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Closes the queue and waits for every in-flight and already-queued
    /// group to be written (or fail out) before returning. Returns the final
    /// failure count once every worker has drained.
    pub async fn shutdown(self) -> u64 {
        drop(self.sender);
        for worker in self.workers {
            let _ = worker.await;
        }
        self.failures.load(Ordering::Relaxed)
    }
}

async fn worker_loop(
    id: usize,
    receiver: Arc<AsyncMutex<mpsc::Receiver<QueuedWrite>>>,
    table_store: Arc<dyn TableStore>,
    backoff: ExponentialBackoff,
    max_retries: u16,
    cancel: CancellationToken,
    failures: Arc<AtomicU64>,
) {
    loop {
        let queued = {
            let mut rx = receiver.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                queued = rx.recv() => queued,
            }
        };
        let Some(QueuedWrite { group, result_tx }) = queued else {
            break;
        };

        let table = group.table;
        let partition = group.partition;
        let rows = group.rows;
        let op_name = format!("bulk_upsert[{table}/{partition}]");

        let result = retry_with_backoff_async(&op_name, max_retries, &backoff, || {
            let table_store = table_store.clone();
            let table = table.clone();
            let partition = partition.clone();
            let rows = rows.clone();
            async move { table_store.bulk_upsert(&table, &partition, rows).await }
        })
        .await;

        let outcome = match result {
            Ok(()) => Ok(()),
            Err(err) => {
                error!(worker = id, %table, %partition, error = %err, "write group dropped after exhausting retries");
                failures.fetch_add(1, Ordering::Relaxed);
                Err(anyhow::Error::from(err))
            }
        };

        // The submitter may have gone away (e.g. cancellation); that's fine,
        // nothing left to report the outcome to.
        let _ = result_tx.send(outcome);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use idx_db::{DbError, RowRange};

    use super::*;

    #[derive(Default)]
    struct RecordingStore {
        written: Mutex<HashMap<(String, String, String), TableRow>>,
    }

    #[async_trait]
    impl TableStore for RecordingStore {
        async fn create_table_if_absent(&self, _table: &str) -> Result<(), DbError> {
            Ok(())
        }

        async fn delete_table(&self, _table: &str) -> Result<(), DbError> {
            Ok(())
        }

        async fn bulk_upsert(
            &self,
            table: &str,
            _partition: &str,
            rows: Vec<TableRow>,
        ) -> Result<(), DbError> {
            let mut written = self.written.lock().unwrap();
            for row in rows {
                written.insert(
                    (table.to_string(), row.partition_key.clone(), row.row_key.clone()),
                    row,
                );
            }
            Ok(())
        }

        async fn get(
            &self,
            _table: &str,
            _partition: &str,
            _row: &str,
        ) -> Result<Option<TableRow>, DbError> {
            Ok(None)
        }

        async fn scan(
            &self,
            _table: &str,
            _partition: &str,
            _range: RowRange,
        ) -> Result<Vec<TableRow>, DbError> {
            Ok(vec![])
        }
    }

    fn row(row_key: &str) -> TableRow {
        TableRow::new("p".into(), row_key.into(), Default::default())
    }

    #[tokio::test]
    async fn submitted_groups_land_in_the_store() {
        let store = Arc::new(RecordingStore::default());
        let cancel = CancellationToken::new();
        let scheduler = WriteScheduler::new(
            store.clone(),
            2,
            8,
            ExponentialBackoff::new(1, 15, 10),
            0,
            cancel.clone(),
        );

        scheduler
            .submit(WriteGroup {
                table: "blocks".into(),
                partition: "p".into(),
                rows: vec![row("a"), row("b")],
            })
            .await
            .unwrap();

        scheduler.shutdown().await;

        let written = store.written.lock().unwrap();
        assert_eq!(written.len(), 2);
    }

    #[derive(Default)]
    struct AlwaysFailStore;

    #[async_trait]
    impl TableStore for AlwaysFailStore {
        async fn create_table_if_absent(&self, _table: &str) -> Result<(), DbError> {
            Ok(())
        }

        async fn delete_table(&self, _table: &str) -> Result<(), DbError> {
            Ok(())
        }

        async fn bulk_upsert(
            &self,
            _table: &str,
            _partition: &str,
            _rows: Vec<TableRow>,
        ) -> Result<(), DbError> {
            Err(DbError::Network("simulated outage".into()))
        }

        async fn get(
            &self,
            _table: &str,
            _partition: &str,
            _row: &str,
        ) -> Result<Option<TableRow>, DbError> {
            Ok(None)
        }

        async fn scan(
            &self,
            _table: &str,
            _partition: &str,
            _range: RowRange,
        ) -> Result<Vec<TableRow>, DbError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn exhausted_retries_surface_as_an_error_from_submit() {
        let store = Arc::new(AlwaysFailStore);
        let cancel = CancellationToken::new();
        let scheduler = WriteScheduler::new(
            store,
            1,
            4,
            ExponentialBackoff::new(1, 15, 10),
            1,
            cancel.clone(),
        );

        let outcome = scheduler
            .submit(WriteGroup {
                table: "blocks".into(),
                partition: "p".into(),
                rows: vec![row("a")],
            })
            .await;
        assert!(outcome.is_err(), "a permanently failed write must surface as an error to the submitter");

        let failures = scheduler.shutdown().await;
        assert_eq!(failures, 1);
    }
}
