//! Paginated key fetch against the remote tabular store
//!
//! Builds the existing-key baseline for a sync run by walking the server's
//! continuation cursor until it reports no more pages. The baseline is
//! rebuilt from the remote store on every run; the store is the source of
//! truth and may be modified externally between runs.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::{debug, info};

use crate::infrastructure::table_store::{SearchFilter, StoreError, TableCoordinates, TableStore};

/// A failed fetch is a distinct outcome from "succeeded with zero keys".
/// Conflating the two silently skips work: an empty baseline makes every
/// candidate look new.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("page request {page_number} failed: {source}")]
    Page {
        page_number: u32,
        #[source]
        source: StoreError,
    },
}

/// Walks a paged search and accumulates results in memory.
pub struct PageFetcher<'a, S: TableStore + ?Sized> {
    store: &'a S,
    page_size: u32,
}

impl<'a, S: TableStore + ?Sized> PageFetcher<'a, S> {
    pub fn new(store: &'a S, page_size: u32) -> Self {
        Self { store, page_size }
    }

    /// Returns every key present in `key_field`, deduplicated and trimmed.
    /// Any page failure fails the whole fetch.
    pub async fn fetch_all_keys(
        &self,
        table: &TableCoordinates,
        key_field: &str,
        filter: Option<&SearchFilter>,
    ) -> Result<HashSet<String>, FetchError> {
        let mut keys = HashSet::new();
        self.walk_pages(table, key_field, filter, |key, _record_id| {
            keys.insert(key);
        })
        .await?;
        Ok(keys)
    }

    /// Like [`fetch_all_keys`](Self::fetch_all_keys) but keeps the remote
    /// `record_id` per key, which the prune path needs for batch deletion.
    /// Rows without a usable key or record id are skipped.
    pub async fn fetch_key_index(
        &self,
        table: &TableCoordinates,
        key_field: &str,
        filter: Option<&SearchFilter>,
    ) -> Result<HashMap<String, String>, FetchError> {
        let mut index = HashMap::new();
        self.walk_pages(table, key_field, filter, |key, record_id| {
            match record_id {
                Some(id) if !id.is_empty() => {
                    index.insert(key, id);
                }
                _ => debug!(key, "row has no record id, skipping"),
            }
        })
        .await?;
        Ok(index)
    }

    /// Cursor-ordered page walk shared by both fetch variants. Invokes
    /// `on_row` with the trimmed key and the remote record id of every row
    /// that carries a usable key.
    async fn walk_pages<F>(
        &self,
        table: &TableCoordinates,
        key_field: &str,
        filter: Option<&SearchFilter>,
        mut on_row: F,
    ) -> Result<(), FetchError>
    where
        F: FnMut(String, Option<String>),
    {
        let field_names = vec![key_field.to_string()];
        let mut page_token: Option<String> = None;
        let mut page_number = 0u32;
        let mut rows = 0usize;

        loop {
            page_number += 1;
            let page = self
                .store
                .search(
                    table,
                    &field_names,
                    filter,
                    self.page_size,
                    page_token.as_deref(),
                )
                .await
                .map_err(|source| FetchError::Page {
                    page_number,
                    source,
                })?;

            debug!(
                page_number,
                rows = page.items.len(),
                has_more = page.has_more,
                "fetched page"
            );

            rows += page.items.len();
            for item in &page.items {
                if let Some(key) = item.key(key_field) {
                    on_row(key, item.record_id.clone());
                }
            }

            // A missing cursor means stop, even if has_more claims otherwise.
            match (page.has_more, page.page_token) {
                (true, Some(token)) => page_token = Some(token),
                _ => break,
            }
        }

        info!(
            table = %table.table_id,
            rows,
            pages = page_number,
            "existing-key baseline built"
        );
        Ok(())
    }
}
