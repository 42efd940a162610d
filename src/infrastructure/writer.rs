//! Chunked batch writes against the remote tabular store
//!
//! The remote API caps batch_create / batch_delete at 500 records per call,
//! so outbound lists are split into chunks and submitted one at a time.
//! Partial success is acceptable and expected to be visible to the operator:
//! a failing chunk is logged and the remaining chunks are still attempted.

use tracing::{info, warn};

use crate::domain::record::Record;
use crate::infrastructure::table_store::{
    MAX_RECORDS_PER_CALL, StoreError, TableCoordinates, TableStore,
};

/// Per-run write tally. `written` only counts records from chunks the remote
/// store confirmed; the caller uses it to decide downstream effects such as
/// sending a notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub written: u32,
    pub attempted_chunks: u32,
    pub failed_chunks: u32,
}

impl WriteReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed_chunks == 0
    }
}

/// Splits outbound record lists into remote-cap-sized chunks.
///
/// Not idempotent on its own: re-running after a partial failure re-inserts
/// the records that did land, because batch_create has no natural dedup.
/// Cross-run dedup is the reconciler's job.
pub struct BatchedWriter<'a, S: TableStore + ?Sized> {
    store: &'a S,
    batch_size: usize,
}

impl<'a, S: TableStore + ?Sized> BatchedWriter<'a, S> {
    /// `batch_size` is clamped to the remote cap; zero is bumped to one.
    pub fn new(store: &'a S, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.clamp(1, MAX_RECORDS_PER_CALL),
        }
    }

    /// Submits `records` in chunks. Chunk failures are logged and skipped.
    pub async fn write_all(&self, table: &TableCoordinates, records: &[Record]) -> WriteReport {
        let mut report = WriteReport::default();
        if records.is_empty() {
            return report;
        }

        for (chunk_index, chunk) in records.chunks(self.batch_size).enumerate() {
            report.attempted_chunks += 1;
            match self.store.batch_create(table, chunk).await {
                Ok(result) if result.success => {
                    report.written += result.created_count;
                }
                Ok(result) => {
                    report.failed_chunks += 1;
                    warn!(
                        chunk = chunk_index + 1,
                        rows = chunk.len(),
                        code = result.error_code.unwrap_or(-1),
                        message = result.error_message.as_deref().unwrap_or("unknown"),
                        "batch_create rejected, continuing with next chunk"
                    );
                }
                Err(error) => {
                    report.failed_chunks += 1;
                    warn!(
                        chunk = chunk_index + 1,
                        rows = chunk.len(),
                        %error,
                        "batch_create failed, continuing with next chunk"
                    );
                }
            }
        }

        info!(
            written = report.written,
            chunks = report.attempted_chunks,
            failed = report.failed_chunks,
            "batched write finished"
        );
        report
    }

    /// Deletes records by id under the same chunking and failure policy.
    pub async fn delete_all(&self, table: &TableCoordinates, record_ids: &[String]) -> WriteReport {
        let mut report = WriteReport::default();
        if record_ids.is_empty() {
            return report;
        }

        for (chunk_index, chunk) in record_ids.chunks(self.batch_size).enumerate() {
            report.attempted_chunks += 1;
            match self.store.batch_delete(table, chunk).await {
                Ok(result) if result.success => {
                    report.written += result.created_count;
                }
                Ok(result) => {
                    report.failed_chunks += 1;
                    warn!(
                        chunk = chunk_index + 1,
                        rows = chunk.len(),
                        code = result.error_code.unwrap_or(-1),
                        message = result.error_message.as_deref().unwrap_or("unknown"),
                        "batch_delete rejected, continuing with next chunk"
                    );
                }
                Err(error) => {
                    report.failed_chunks += 1;
                    warn!(
                        chunk = chunk_index + 1,
                        rows = chunk.len(),
                        %error,
                        "batch_delete failed, continuing with next chunk"
                    );
                }
            }
        }

        info!(
            deleted = report.written,
            chunks = report.attempted_chunks,
            failed = report.failed_chunks,
            "batched delete finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::table_store::{BatchWriteResult, SearchFilter, SearchPage};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records the size of every batch_create call; calls listed in
    /// `reject_calls` come back as remote rejections.
    #[derive(Default)]
    struct RecordingStore {
        call_sizes: Mutex<Vec<usize>>,
        reject_calls: Vec<usize>,
    }

    #[async_trait]
    impl TableStore for RecordingStore {
        async fn search(
            &self,
            _table: &TableCoordinates,
            _field_names: &[String],
            _filter: Option<&SearchFilter>,
            _page_size: u32,
            _page_token: Option<&str>,
        ) -> Result<SearchPage, StoreError> {
            unimplemented!("write-only test store")
        }

        async fn batch_create(
            &self,
            _table: &TableCoordinates,
            records: &[Record],
        ) -> Result<BatchWriteResult, StoreError> {
            let mut sizes = self.call_sizes.lock().unwrap();
            sizes.push(records.len());
            if self.reject_calls.contains(&sizes.len()) {
                return Ok(BatchWriteResult::rejected(1254290, "TooManyRequest"));
            }
            Ok(BatchWriteResult::created(records.len() as u32))
        }

        async fn batch_delete(
            &self,
            _table: &TableCoordinates,
            record_ids: &[String],
        ) -> Result<BatchWriteResult, StoreError> {
            let mut sizes = self.call_sizes.lock().unwrap();
            sizes.push(record_ids.len());
            if self.reject_calls.contains(&sizes.len()) {
                return Ok(BatchWriteResult::rejected(1254290, "TooManyRequest"));
            }
            Ok(BatchWriteResult::created(record_ids.len() as u32))
        }
    }

    fn table() -> TableCoordinates {
        TableCoordinates::new("app", "tbl")
    }

    fn records(count: usize) -> Vec<Record> {
        (0..count)
            .map(|i| Record::new().with_field("product_id", format!("P-{i}")))
            .collect()
    }

    #[tokio::test]
    async fn twelve_hundred_records_become_three_calls() {
        let store = RecordingStore::default();
        let writer = BatchedWriter::new(&store, 500);

        let report = writer.write_all(&table(), &records(1200)).await;

        assert_eq!(*store.call_sizes.lock().unwrap(), vec![500, 500, 200]);
        assert_eq!(report.written, 1200);
        assert!(report.all_succeeded());
    }

    #[tokio::test]
    async fn middle_chunk_failure_does_not_stop_the_rest() {
        let store = RecordingStore {
            reject_calls: vec![2],
            ..RecordingStore::default()
        };
        let writer = BatchedWriter::new(&store, 500);

        let report = writer.write_all(&table(), &records(1200)).await;

        assert_eq!(store.call_sizes.lock().unwrap().len(), 3);
        assert_eq!(report.written, 700);
        assert_eq!(report.failed_chunks, 1);
        assert_eq!(report.attempted_chunks, 3);
    }

    #[tokio::test]
    async fn empty_input_issues_no_calls() {
        let store = RecordingStore::default();
        let writer = BatchedWriter::new(&store, 500);

        let report = writer.write_all(&table(), &[]).await;

        assert!(store.call_sizes.lock().unwrap().is_empty());
        assert_eq!(report, WriteReport::default());
    }

    #[tokio::test]
    async fn batch_size_is_clamped_to_the_remote_cap() {
        let store = RecordingStore::default();
        let writer = BatchedWriter::new(&store, 9000);

        writer.write_all(&table(), &records(600)).await;

        assert_eq!(*store.call_sizes.lock().unwrap(), vec![500, 100]);
    }

    #[tokio::test]
    async fn delete_uses_the_same_chunking_policy() {
        let store = RecordingStore::default();
        let writer = BatchedWriter::new(&store, 500);
        let ids: Vec<String> = (0..700).map(|i| format!("rec{i}")).collect();

        let report = writer.delete_all(&table(), &ids).await;

        assert_eq!(*store.call_sizes.lock().unwrap(), vec![500, 200]);
        assert_eq!(report.written, 700);
    }
}
