//! Product id sync task with per-store fan-out
//!
//! Candidates come from the per-store product listings of the merchant
//! console; the existing baseline is fetched from the product table with one
//! bounded-concurrency fetch per store (fan-out/fan-in, no shared mutable
//! state between workers). A store whose baseline fetch fails is dropped
//! from the run entirely, so its candidates cannot be mistaken for new rows;
//! sibling stores continue unaffected.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::application::commission_sync::SyncOutcome;
use crate::domain::record::{FieldValue, Record, normalize_key};
use crate::domain::reconcile::reconcile;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::fetcher::PageFetcher;
use crate::infrastructure::notify::NotificationSink;
use crate::infrastructure::session::PageActions;
use crate::infrastructure::table_store::{SearchFilter, TableCoordinates, TableStore};
use crate::infrastructure::writer::BatchedWriter;

/// Field names of the product table.
pub const PRODUCT_ID_FIELD: &str = "product_id";
pub const STORE_ID_FIELD: &str = "store_id";
pub const SYNCED_AT_FIELD: &str = "synced_at";

/// Console selector for the per-store product listing.
const PRODUCT_LIST_SELECTOR: &str = "#product-list .id-column";

/// Parses a per-store product export: one line per row,
/// `store_id<TAB>product_id`. Used both for file-based input and for text
/// read out of the console listing.
pub fn parse_product_export(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| {
            let mut columns = line.split('\t');
            let store_id = columns.next().and_then(normalize_key)?;
            let product_id = columns.next().and_then(normalize_key)?;
            Some((store_id, product_id))
        })
        .collect()
}

pub struct ProductIdSyncTask<'a, S: TableStore + ?Sized> {
    store: &'a S,
    config: &'a AppConfig,
    notifier: Option<&'a dyn NotificationSink>,
}

impl<'a, S: TableStore + ?Sized> ProductIdSyncTask<'a, S> {
    pub fn new(
        store: &'a S,
        config: &'a AppConfig,
        notifier: Option<&'a dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            config,
            notifier,
        }
    }

    fn table(&self) -> TableCoordinates {
        TableCoordinates::new(
            &self.config.tables.app_token,
            &self.config.tables.product_table_id,
        )
    }

    /// Full run: scrape each store's listing sequentially through the shared
    /// browser session, then reconcile and write. A store whose scrape fails
    /// is skipped; its siblings continue.
    pub async fn run(&self, pages: &dyn PageActions) -> Result<SyncOutcome> {
        let mut candidates: HashMap<String, HashSet<String>> = HashMap::new();
        for store_id in &self.config.tables.store_ids {
            match self.scrape_store_listing(pages, store_id).await {
                Ok(ids) => {
                    info!(store_id, products = ids.len(), "store listing scraped");
                    candidates.insert(store_id.clone(), ids);
                }
                Err(error) => {
                    warn!(store_id, %error, "store listing failed, skipping store");
                }
            }
        }
        self.run_with_candidates(candidates).await
    }

    /// Pipeline entry for externally produced candidates, keyed by store id.
    pub async fn run_with_candidates(
        &self,
        candidates: HashMap<String, HashSet<String>>,
    ) -> Result<SyncOutcome> {
        let table = self.table();
        let baselines = self.fetch_baselines(&table, candidates.keys()).await?;

        // Union only over stores whose baseline is trustworthy.
        let mut existing: HashSet<String> = HashSet::new();
        let mut candidate_keys: HashSet<String> = HashSet::new();
        let mut store_of: HashMap<String, String> = HashMap::new();
        for (store_id, baseline) in &baselines {
            existing.extend(baseline.iter().cloned());
            if let Some(ids) = candidates.get(store_id) {
                for id in ids {
                    candidate_keys.insert(id.clone());
                    store_of.insert(id.clone(), store_id.clone());
                }
            }
        }

        let delta = reconcile(&candidate_keys, &existing);
        let now = FieldValue::timestamp(Utc::now());
        let to_write: Vec<Record> = delta
            .iter()
            .map(|product_id| {
                Record::new()
                    .with_field(PRODUCT_ID_FIELD, product_id.clone())
                    .with_field(
                        STORE_ID_FIELD,
                        store_of.get(product_id).cloned().unwrap_or_default(),
                    )
                    .with_field(SYNCED_AT_FIELD, now.clone())
            })
            .collect();

        let writer = BatchedWriter::new(self.store, self.config.sync.batch_size);
        let report = writer.write_all(&table, &to_write).await;

        let outcome = SyncOutcome {
            existing: existing.len(),
            candidates: candidate_keys.len(),
            delta: delta.len(),
            report,
            pruned: Default::default(),
        };
        info!("{}", outcome.summary("product-id-sync"));

        if let Some(notifier) = self.notifier {
            if outcome.report.written > 0 || !outcome.report.all_succeeded() {
                notifier.post_text(&outcome.summary("product-id-sync")).await;
            }
        }

        Ok(outcome)
    }

    /// Fan-out/fan-in: one baseline fetch per store under a bounded worker
    /// pool. Each worker returns an independent set; the caller unions them.
    /// Failed stores are reported and omitted from the result.
    async fn fetch_baselines<'b, I>(
        &self,
        table: &TableCoordinates,
        store_ids: I,
    ) -> Result<HashMap<String, HashSet<String>>>
    where
        I: Iterator<Item = &'b String>,
    {
        let semaphore = Arc::new(Semaphore::new(self.config.sync.worker_count.max(1)));
        let policy = self.config.retry.policy();
        let page_size = self.config.sync.page_size;

        let fetches = store_ids.map(|store_id| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("fan-out semaphore closed");
                let fetcher = PageFetcher::new(self.store, page_size);
                let filter = SearchFilter::new().field_is(STORE_ID_FIELD, store_id);
                let outcome = policy
                    .run("fetch store baseline", || {
                        fetcher.fetch_all_keys(table, PRODUCT_ID_FIELD, Some(&filter))
                    })
                    .await;
                (store_id.clone(), outcome.into_result())
            }
        });

        let results = futures::future::join_all(fetches).await;
        if results.is_empty() {
            return Ok(HashMap::new());
        }

        let total = results.len();
        let mut baselines = HashMap::new();
        for (store_id, result) in results {
            match result {
                Ok(keys) => {
                    baselines.insert(store_id, keys);
                }
                Err(error) => {
                    warn!(store_id, %error, "baseline fetch failed, dropping store from run");
                }
            }
        }

        // All stores failing means the remote store itself is unreachable.
        if baselines.is_empty() {
            anyhow::bail!("baseline fetch failed for all {total} store(s)");
        }
        Ok(baselines)
    }

    async fn scrape_store_listing(
        &self,
        pages: &dyn PageActions,
        store_id: &str,
    ) -> Result<HashSet<String>> {
        let browser = &self.config.browser;
        let wait = Duration::from_secs(browser.page_wait_timeout_seconds);
        let policy = self.config.retry.policy();
        let url = browser.product_list_url.replace("{store_id}", store_id);
        let diagnostic_label = format!("product-list-{store_id}");

        pages
            .navigate(&url)
            .await
            .with_context(|| format!("could not open product listing for store {store_id}"))?;

        policy
            .run_with_diagnostic(
                "wait for product listing",
                || pages.wait_for_visible(PRODUCT_LIST_SELECTOR, wait),
                |_err| pages.capture_diagnostic(&diagnostic_label),
            )
            .await
            .into_result()
            .with_context(|| format!("product listing never appeared for store {store_id}"))?;

        let text = pages
            .read_text(PRODUCT_LIST_SELECTOR)
            .await
            .with_context(|| format!("could not read product listing for store {store_id}"))?;

        Ok(text.lines().filter_map(normalize_key).collect())
    }
}
