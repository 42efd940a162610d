//! Commission order sync task
//!
//! One pass: build the existing-key baseline from the commission table,
//! scrape the settlement export from the merchant console, reconcile, write
//! only the delta in chunks, and post an outcome summary when anything
//! changed. Shared setup failures (navigation, baseline fetch) abort the
//! task; per-row problems are logged and skipped.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::domain::record::{FieldValue, Record, normalize_key};
use crate::domain::reconcile::reconcile;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::fetcher::PageFetcher;
use crate::infrastructure::notify::NotificationSink;
use crate::infrastructure::session::PageActions;
use crate::infrastructure::table_store::{TableCoordinates, TableStore};
use crate::infrastructure::writer::{BatchedWriter, WriteReport};

/// Field names of the commission table.
pub const ORDER_ID_FIELD: &str = "order_id";
pub const AMOUNT_FIELD: &str = "amount";
pub const SETTLED_AT_FIELD: &str = "settled_at";

/// Console selectors for the settlement export view.
const EXPORT_ROWS_SELECTOR: &str = "#settlement-panel .export-rows";

/// Outcome counts of one sync run, reported to the operator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOutcome {
    pub existing: usize,
    pub candidates: usize,
    pub delta: usize,
    pub report: WriteReport,
    pub pruned: WriteReport,
}

impl SyncOutcome {
    pub fn summary(&self, task: &str) -> String {
        format!(
            "{task}: {} existing, {} scraped, {} new, {} written ({} chunk(s) failed), {} pruned",
            self.existing,
            self.candidates,
            self.delta,
            self.report.written,
            self.report.failed_chunks,
            self.pruned.written,
        )
    }
}

/// Parses the tab-separated settlement export: one row per line,
/// `order_id<TAB>amount<TAB>settled_at_ms`. Malformed lines are logged and
/// skipped; they never abort the run.
pub fn parse_commission_export(text: &str) -> Vec<Record> {
    let mut records = Vec::new();
    for (line_number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let mut columns = line.split('\t');
        let order_id = columns.next().and_then(normalize_key);
        let amount = columns.next().and_then(|c| c.trim().parse::<f64>().ok());
        let settled_at = columns.next().and_then(|c| c.trim().parse::<i64>().ok());

        match (order_id, amount) {
            (Some(order_id), Some(amount)) => {
                let mut record = Record::new()
                    .with_field(ORDER_ID_FIELD, order_id)
                    .with_field(AMOUNT_FIELD, amount);
                if let Some(ms) = settled_at {
                    record
                        .fields
                        .insert(SETTLED_AT_FIELD.to_string(), FieldValue::Timestamp(ms));
                }
                records.push(record);
            }
            _ => warn!(line = line_number + 1, "skipping malformed export row"),
        }
    }
    records
}

pub struct CommissionSyncTask<'a, S: TableStore + ?Sized> {
    store: &'a S,
    config: &'a AppConfig,
    notifier: Option<&'a dyn NotificationSink>,
}

impl<'a, S: TableStore + ?Sized> CommissionSyncTask<'a, S> {
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
            &self.config.tables.commission_table_id,
        )
    }

    /// Full run: scrape the console export through `pages`, then reconcile
    /// and write. Structural scrape failures abort the task.
    pub async fn run(&self, pages: &dyn PageActions) -> Result<SyncOutcome> {
        let candidates = self.scrape_export(pages).await?;
        self.run_with_candidates(candidates).await
    }

    /// Pipeline entry for candidates produced outside the browser seam
    /// (e.g. an export file captured by a separate automation step).
    pub async fn run_with_candidates(&self, candidates: Vec<Record>) -> Result<SyncOutcome> {
        let table = self.table();
        let policy = self.config.retry.policy();
        let fetcher = PageFetcher::new(self.store, self.config.sync.page_size);

        // Baseline failure is structural: without it every candidate would
        // look new and the run would duplicate rows.
        let existing_index: HashMap<String, String> = policy
            .run("fetch commission baseline", || {
                fetcher.fetch_key_index(&table, ORDER_ID_FIELD, None)
            })
            .await
            .into_result()
            .context("could not build the existing-key baseline")?;
        let existing: HashSet<String> = existing_index.keys().cloned().collect();

        let candidate_keys: HashSet<String> = candidates
            .iter()
            .filter_map(|r| r.key(ORDER_ID_FIELD))
            .collect();
        let delta = reconcile(&candidate_keys, &existing);

        let mut written_keys = HashSet::new();
        let to_write: Vec<Record> = candidates
            .iter()
            .filter(|r| {
                r.key(ORDER_ID_FIELD)
                    .is_some_and(|k| delta.contains(&k) && written_keys.insert(k))
            })
            .cloned()
            .collect();

        let writer = BatchedWriter::new(self.store, self.config.sync.batch_size);
        let report = writer.write_all(&table, &to_write).await;

        // An empty candidate set makes every existing row look stale; that is
        // far more likely a broken scrape than a genuinely emptied console,
        // so never turn it into a full table wipe.
        let pruned = if self.config.sync.prune_removed && candidate_keys.is_empty() {
            warn!("candidate set is empty, skipping prune to protect the remote table");
            WriteReport::default()
        } else if self.config.sync.prune_removed {
            let stale_ids: Vec<String> = existing_index
                .iter()
                .filter(|(key, _)| !candidate_keys.contains(*key))
                .map(|(_, id)| id.clone())
                .collect();
            writer.delete_all(&table, &stale_ids).await
        } else {
            WriteReport::default()
        };

        let outcome = SyncOutcome {
            existing: existing.len(),
            candidates: candidate_keys.len(),
            delta: delta.len(),
            report,
            pruned,
        };
        info!("{}", outcome.summary("commission-sync"));

        if let Some(notifier) = self.notifier {
            if outcome.report.written > 0 || !outcome.report.all_succeeded() {
                notifier.post_text(&outcome.summary("commission-sync")).await;
            }
        }

        Ok(outcome)
    }

    /// Drives the console through the page-action seam and parses the
    /// settlement export rows.
    async fn scrape_export(&self, pages: &dyn PageActions) -> Result<Vec<Record>> {
        let browser = &self.config.browser;
        let wait = Duration::from_secs(browser.page_wait_timeout_seconds);
        let policy = self.config.retry.policy();

        pages
            .navigate(&browser.commission_url)
            .await
            .context("could not load the settlement console")?;

        policy
            .run_with_diagnostic(
                "wait for settlement export",
                || pages.wait_for_visible(EXPORT_ROWS_SELECTOR, wait),
                |_err| pages.capture_diagnostic("settlement-export"),
            )
            .await
            .into_result()
            .context("settlement export never became visible")?;

        let text = pages
            .read_text(EXPORT_ROWS_SELECTOR)
            .await
            .context("could not read the settlement export")?;
        let records = parse_commission_export(&text);
        info!(rows = records.len(), "settlement export scraped");
        Ok(records)
    }
}
