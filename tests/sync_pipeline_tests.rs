//! End-to-end pipeline tests against an in-memory tabular store and a fake
//! browser session. No network, no webdriver.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use bitable_sync::application::{CommissionSyncTask, ProductIdSyncTask};
use bitable_sync::application::commission_sync::{AMOUNT_FIELD, ORDER_ID_FIELD};
use bitable_sync::application::product_id_sync::{PRODUCT_ID_FIELD, STORE_ID_FIELD};
use bitable_sync::domain::record::Record;
use bitable_sync::infrastructure::config::AppConfig;
use bitable_sync::infrastructure::notify::NotificationSink;
use bitable_sync::infrastructure::session::{PageActions, PageError};
use bitable_sync::infrastructure::table_store::{
    BatchWriteResult, FilterOperator, SearchFilter, SearchPage, StoreError, TableCoordinates,
    TableStore,
};

/// In-memory tabular store with real pagination and filter support.
#[derive(Default)]
struct MemoryStore {
    rows: Mutex<Vec<Record>>,
    create_call_sizes: Mutex<Vec<usize>>,
    reject_create_calls: Vec<usize>,
    next_id: AtomicU32,
}

impl MemoryStore {
    fn seeded(key_field: &str, keys: &[(&str, Option<&str>)]) -> Self {
        let store = Self::default();
        {
            let mut rows = store.rows.lock().unwrap();
            for (key, store_id) in keys {
                let id = store.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                let mut record = Record::new().with_field(key_field, *key);
                if let Some(store_id) = store_id {
                    record = record.with_field(STORE_ID_FIELD, *store_id);
                }
                record.record_id = Some(format!("rec{id}"));
                rows.push(record);
            }
        }
        store
    }

    fn matches(record: &Record, filter: Option<&SearchFilter>) -> bool {
        let Some(filter) = filter else { return true };
        filter.conditions.iter().all(|condition| {
            let value = record.text(&condition.field_name);
            match &condition.operator {
                FilterOperator::IsEmpty => value.is_none_or(|v| v.trim().is_empty()),
                FilterOperator::IsNotEmpty => value.is_some_and(|v| !v.trim().is_empty()),
                FilterOperator::Is(expected) => value == Some(expected.as_str()),
            }
        })
    }
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn search(
        &self,
        _table: &TableCoordinates,
        _field_names: &[String],
        filter: Option<&SearchFilter>,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<SearchPage, StoreError> {
        let rows = self.rows.lock().unwrap();
        let matching: Vec<Record> = rows
            .iter()
            .filter(|r| Self::matches(r, filter))
            .cloned()
            .collect();

        let offset = page_token.map_or(0, |t| t.parse::<usize>().unwrap());
        let end = (offset + page_size as usize).min(matching.len());
        let has_more = end < matching.len();
        Ok(SearchPage {
            items: matching[offset..end].to_vec(),
            has_more,
            page_token: has_more.then(|| end.to_string()),
        })
    }

    async fn batch_create(
        &self,
        _table: &TableCoordinates,
        records: &[Record],
    ) -> Result<BatchWriteResult, StoreError> {
        let call_number = {
            let mut sizes = self.create_call_sizes.lock().unwrap();
            sizes.push(records.len());
            sizes.len()
        };
        if self.reject_create_calls.contains(&call_number) {
            return Ok(BatchWriteResult::rejected(1254290, "TooManyRequest"));
        }

        let mut rows = self.rows.lock().unwrap();
        for record in records {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let mut stored = record.clone();
            stored.record_id = Some(format!("rec{id}"));
            rows.push(stored);
        }
        Ok(BatchWriteResult::created(records.len() as u32))
    }

    async fn batch_delete(
        &self,
        _table: &TableCoordinates,
        record_ids: &[String],
    ) -> Result<BatchWriteResult, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        rows.retain(|r| {
            r.record_id
                .as_ref()
                .is_none_or(|id| !record_ids.contains(id))
        });
        Ok(BatchWriteResult::created(record_ids.len() as u32))
    }
}

/// Scripted browser: serves canned text per selector, optionally failing the
/// first N visibility waits.
struct FakeBrowser {
    page_text: String,
    failing_waits: AtomicU32,
    diagnostics: AtomicU32,
}

impl FakeBrowser {
    fn new(page_text: &str) -> Self {
        Self {
            page_text: page_text.to_string(),
            failing_waits: AtomicU32::new(0),
            diagnostics: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl PageActions for FakeBrowser {
    async fn navigate(&self, _url: &str) -> Result<(), PageError> {
        Ok(())
    }

    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> Result<(), PageError> {
        if self.failing_waits.load(Ordering::SeqCst) > 0 {
            self.failing_waits.fetch_sub(1, Ordering::SeqCst);
            return Err(PageError::Timeout {
                selector: selector.to_string(),
                waited: timeout,
            });
        }
        Ok(())
    }

    async fn read_text(&self, _selector: &str) -> Result<String, PageError> {
        Ok(self.page_text.clone())
    }

    async fn click(&self, _selector: &str) -> Result<(), PageError> {
        Ok(())
    }

    async fn fill(&self, _selector: &str, _value: &str) -> Result<(), PageError> {
        Ok(())
    }

    async fn capture_diagnostic(&self, _label: &str) {
        self.diagnostics.fetch_add(1, Ordering::SeqCst);
    }
}

/// Counts notification posts and keeps the last message for inspection.
#[derive(Default)]
struct CountingSink {
    posts: AtomicU32,
    last_message: Mutex<Option<String>>,
}

#[async_trait]
impl NotificationSink for CountingSink {
    async fn post_text(&self, content: &str) {
        self.posts.fetch_add(1, Ordering::SeqCst);
        *self.last_message.lock().unwrap() = Some(content.to_string());
    }
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.store.app_id = "cli_test".to_string();
    config.store.app_secret = "secret".to_string();
    config.tables.app_token = "bastest".to_string();
    config.tables.commission_table_id = "tblC".to_string();
    config.tables.product_table_id = "tblP".to_string();
    config.retry.max_attempts = 2;
    config.retry.delay_seconds = 0;
    config
}

fn commission_record(order_id: &str) -> Record {
    Record::new()
        .with_field(ORDER_ID_FIELD, order_id)
        .with_field(AMOUNT_FIELD, 10.0)
}

#[tokio::test]
async fn delta_is_written_in_a_single_batch_call() {
    // existing {A, B}, candidates {B, C, D} -> exactly {C, D} written
    let store = MemoryStore::seeded(ORDER_ID_FIELD, &[("A", None), ("B", None)]);
    let config = test_config();
    let task = CommissionSyncTask::new(&store, &config, None);

    let outcome = task
        .run_with_candidates(vec![
            commission_record("B"),
            commission_record("C"),
            commission_record("D"),
        ])
        .await
        .unwrap();

    assert_eq!(outcome.existing, 2);
    assert_eq!(outcome.candidates, 3);
    assert_eq!(outcome.delta, 2);
    assert_eq!(outcome.report.written, 2);
    assert_eq!(*store.create_call_sizes.lock().unwrap(), vec![2]);

    let keys: HashSet<String> = store
        .rows
        .lock()
        .unwrap()
        .iter()
        .filter_map(|r| r.key(ORDER_ID_FIELD))
        .collect();
    assert!(keys.contains("C") && keys.contains("D"));
    assert_eq!(keys.len(), 4);
}

#[tokio::test]
async fn rerun_with_same_candidates_writes_nothing() {
    let store = MemoryStore::seeded(ORDER_ID_FIELD, &[("A", None)]);
    let config = test_config();
    let task = CommissionSyncTask::new(&store, &config, None);
    let candidates = || vec![commission_record("A"), commission_record("B")];

    let first = task.run_with_candidates(candidates()).await.unwrap();
    assert_eq!(first.report.written, 1);

    let second = task.run_with_candidates(candidates()).await.unwrap();
    assert_eq!(second.delta, 0);
    assert_eq!(second.report.written, 0);
    // no second create call was issued
    assert_eq!(*store.create_call_sizes.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn duplicate_candidate_keys_are_written_once() {
    let store = MemoryStore::default();
    let config = test_config();
    let task = CommissionSyncTask::new(&store, &config, None);

    let outcome = task
        .run_with_candidates(vec![
            commission_record(" X "),
            commission_record("X"),
            commission_record("Y"),
        ])
        .await
        .unwrap();

    assert_eq!(outcome.candidates, 2);
    assert_eq!(outcome.report.written, 2);
}

#[tokio::test]
async fn partial_batch_failure_reports_counts_and_continues() {
    let mut store = MemoryStore::default();
    store.reject_create_calls = vec![2];
    let mut config = test_config();
    config.sync.batch_size = 2;
    let task = CommissionSyncTask::new(&store, &config, None);

    let candidates: Vec<Record> = (0..6)
        .map(|i| commission_record(&format!("ORD-{i}")))
        .collect();
    let outcome = task.run_with_candidates(candidates).await.unwrap();

    assert_eq!(*store.create_call_sizes.lock().unwrap(), vec![2, 2, 2]);
    assert_eq!(outcome.report.written, 4);
    assert_eq!(outcome.report.failed_chunks, 1);
}

#[tokio::test]
async fn prune_removes_rows_whose_keys_disappeared() {
    let store = MemoryStore::seeded(ORDER_ID_FIELD, &[("A", None), ("B", None), ("C", None)]);
    let mut config = test_config();
    config.sync.prune_removed = true;
    let task = CommissionSyncTask::new(&store, &config, None);

    let outcome = task
        .run_with_candidates(vec![commission_record("A")])
        .await
        .unwrap();

    assert_eq!(outcome.pruned.written, 2);
    let keys: HashSet<String> = store
        .rows
        .lock()
        .unwrap()
        .iter()
        .filter_map(|r| r.key(ORDER_ID_FIELD))
        .collect();
    assert_eq!(keys, HashSet::from(["A".to_string()]));
}

#[tokio::test]
async fn prune_is_skipped_when_the_candidate_set_is_empty() {
    // An empty scrape must never be allowed to empty the remote table.
    let store = MemoryStore::seeded(ORDER_ID_FIELD, &[("A", None), ("B", None), ("C", None)]);
    let mut config = test_config();
    config.sync.prune_removed = true;
    let task = CommissionSyncTask::new(&store, &config, None);

    let outcome = task.run_with_candidates(vec![]).await.unwrap();

    assert_eq!(outcome.pruned.written, 0);
    assert_eq!(outcome.pruned.attempted_chunks, 0);
    let keys: HashSet<String> = store
        .rows
        .lock()
        .unwrap()
        .iter()
        .filter_map(|r| r.key(ORDER_ID_FIELD))
        .collect();
    assert_eq!(
        keys,
        HashSet::from(["A".to_string(), "B".to_string(), "C".to_string()])
    );
}

#[tokio::test]
async fn notification_fires_exactly_once_when_rows_were_written() {
    let store = MemoryStore::seeded(ORDER_ID_FIELD, &[("A", None)]);
    let config = test_config();
    let sink = CountingSink::default();
    let task = CommissionSyncTask::new(&store, &config, Some(&sink));

    task.run_with_candidates(vec![commission_record("A"), commission_record("B")])
        .await
        .unwrap();

    assert_eq!(sink.posts.load(Ordering::SeqCst), 1);
    let message = sink.last_message.lock().unwrap().clone().unwrap();
    assert!(message.contains("1 written"), "summary was: {message}");
}

#[tokio::test]
async fn notification_fires_when_a_chunk_fails_even_with_nothing_written() {
    let mut store = MemoryStore::default();
    store.reject_create_calls = vec![1];
    let config = test_config();
    let sink = CountingSink::default();
    let task = CommissionSyncTask::new(&store, &config, Some(&sink));

    let outcome = task
        .run_with_candidates(vec![commission_record("A")])
        .await
        .unwrap();

    assert_eq!(outcome.report.written, 0);
    assert_eq!(outcome.report.failed_chunks, 1);
    assert_eq!(sink.posts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn notification_stays_silent_on_a_no_op_run() {
    let store = MemoryStore::seeded(ORDER_ID_FIELD, &[("A", None)]);
    let config = test_config();
    let sink = CountingSink::default();
    let task = CommissionSyncTask::new(&store, &config, Some(&sink));

    let outcome = task
        .run_with_candidates(vec![commission_record("A")])
        .await
        .unwrap();

    assert_eq!(outcome.report.written, 0);
    assert_eq!(sink.posts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn browser_driven_commission_sync_survives_flaky_waits() {
    let store = MemoryStore::default();
    let mut config = test_config();
    config.browser.commission_url = "https://merchant.example.com/settlement".to_string();

    let browser = FakeBrowser::new("ORD-1\t12.5\t1700000000000\nORD-2\t3.0\t1700000300000\n");
    browser.failing_waits.store(1, Ordering::SeqCst);

    let task = CommissionSyncTask::new(&store, &config, None);
    let outcome = task.run(&browser).await.unwrap();

    assert_eq!(outcome.candidates, 2);
    assert_eq!(outcome.report.written, 2);
    // the wait recovered on retry, so no diagnostic was captured
    assert_eq!(browser.diagnostics.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn browser_wait_exhaustion_captures_a_diagnostic_and_aborts() {
    let store = MemoryStore::default();
    let mut config = test_config();
    config.browser.commission_url = "https://merchant.example.com/settlement".to_string();

    let browser = FakeBrowser::new("");
    browser.failing_waits.store(10, Ordering::SeqCst);

    let task = CommissionSyncTask::new(&store, &config, None);
    let result = task.run(&browser).await;

    assert!(result.is_err());
    assert_eq!(browser.diagnostics.load(Ordering::SeqCst), 1);
    assert!(store.create_call_sizes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn product_sync_fans_out_per_store_and_unions_baselines() {
    let store = MemoryStore::seeded(
        PRODUCT_ID_FIELD,
        &[("P-1", Some("S-1")), ("P-2", Some("S-2"))],
    );
    let mut config = test_config();
    config.tables.store_ids = vec!["S-1".to_string(), "S-2".to_string()];

    let mut candidates: HashMap<String, HashSet<String>> = HashMap::new();
    candidates.insert(
        "S-1".to_string(),
        HashSet::from(["P-1".to_string(), "P-3".to_string()]),
    );
    candidates.insert(
        "S-2".to_string(),
        HashSet::from(["P-2".to_string(), "P-4".to_string()]),
    );

    let task = ProductIdSyncTask::new(&store, &config, None);
    let outcome = task.run_with_candidates(candidates).await.unwrap();

    assert_eq!(outcome.existing, 2);
    assert_eq!(outcome.delta, 2);
    assert_eq!(outcome.report.written, 2);

    let rows = store.rows.lock().unwrap();
    let new_row = rows
        .iter()
        .find(|r| r.key(PRODUCT_ID_FIELD) == Some("P-3".to_string()))
        .expect("P-3 written");
    assert_eq!(new_row.text(STORE_ID_FIELD), Some("S-1"));
}

#[tokio::test]
async fn product_sync_scrapes_each_store_through_the_shared_session() {
    let store = MemoryStore::default();
    let mut config = test_config();
    config.tables.store_ids = vec!["S-1".to_string()];
    config.browser.product_list_url =
        "https://merchant.example.com/stores/{store_id}/products".to_string();

    let browser = FakeBrowser::new("P-10\nP-11\n\n P-12 \n");
    let task = ProductIdSyncTask::new(&store, &config, None);
    let outcome = task.run(&browser).await.unwrap();

    assert_eq!(outcome.candidates, 3);
    assert_eq!(outcome.report.written, 3);
}
