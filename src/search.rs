//! Paginated search facade.
//!
//! Wraps a [`SearchClient`] in the page-driven loop every caller needs:
//! fixed request limit, per-page timeout, cursor following, and one merged
//! collection out the other end.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::cloud::{CloudError, ResourceSummary, SearchClient, StructuredSearchRequest};

/// Page size requested from the catalog.
pub const SEARCH_LIMIT: u32 = 1000;

/// Default per-page timeout.
pub const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// A failed scan. The first bad page aborts the search; `collected` reports
/// how many items had been merged before the failure.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search page {page} failed after {collected} items: {source}")]
    Page {
        page: usize,
        collected: usize,
        #[source]
        source: CloudError,
    },

    #[error("search page {page} timed out after {timeout:?} ({collected} items collected)")]
    PageTimeout {
        page: usize,
        timeout: Duration,
        collected: usize,
    },
}

/// Structured-search wrapper returning a single merged collection.
#[derive(Clone)]
pub struct Search {
    client: Arc<dyn SearchClient>,
    page_timeout: Duration,
}

impl Search {
    #[must_use]
    pub fn new(client: Arc<dyn SearchClient>) -> Self {
        Self { client, page_timeout: DEFAULT_PAGE_TIMEOUT }
    }

    #[must_use]
    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    /// Runs `query` to completion, following `next_page` cursors.
    pub async fn search(&self, query: &str) -> Result<Vec<ResourceSummary>, SearchError> {
        let mut request = StructuredSearchRequest::new(query, SEARCH_LIMIT);
        let mut items: Vec<ResourceSummary> = Vec::new();
        let mut page_index = 0usize;

        debug!(query, "starting structured search");
        loop {
            let page = match tokio::time::timeout(self.page_timeout, self.client.search(&request))
                .await
            {
                Ok(Ok(page)) => page,
                Ok(Err(source)) => {
                    return Err(SearchError::Page { page: page_index, collected: items.len(), source });
                }
                Err(_) => {
                    return Err(SearchError::PageTimeout {
                        page: page_index,
                        timeout: self.page_timeout,
                        collected: items.len(),
                    });
                }
            };

            items.extend(page.items);
            page_index += 1;

            match page.next_page {
                Some(cursor) => request.page = Some(cursor),
                None => break,
            }
        }

        debug!(results = items.len(), pages = page_index, "search finished");
        Ok(items)
    }
}

impl std::fmt::Debug for Search {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Search")
            .field("page_timeout", &self.page_timeout)
            .finish_non_exhaustive()
    }
}
