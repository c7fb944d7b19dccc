//! # Page Fetcher
//!
//! Discovery stage. For one namespace it reads the name count, then lists the
//! namespace page by page, fetching the blockchain record of every name in a
//! page and emitting the page's records downstream as a single `RecordBatch`.
//!
//! Pages are fetched concurrently, bounded by a `PageLimiter` shared by every
//! namespace of the run. A page task holds its permit for its whole lifetime
//! (listing, record fetches and the hand-off) and gives it back when the task
//! ends, whatever the outcome.

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::NamingClient;
use crate::cursor::Cursor;
use crate::record::{Record, RecordBatch};
use crate::retry::RetryPolicy;
use crate::stats::PipelineStats;

/// Number of pages needed to cover `total` names.
pub fn page_count(total: u64, page_size: u64) -> u64 {
    total.div_ceil(page_size.max(1))
}

/// Page indices to request for a namespace holding `total` names: every full
/// or partial page plus one boundary page past the end, which picks up names
/// registered between the count and the listing.
pub fn page_indices(total: u64, page_size: u64) -> std::ops::RangeInclusive<u64> {
    0..=page_count(total, page_size)
}

/// Counting limiter for concurrent page fetches.
#[derive(Debug, Clone)]
pub struct PageLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl PageLimiter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a slot. `None` when the run is cancelled first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Option<OwnedSemaphorePermit> {
        tokio::select! {
            _ = cancel.cancelled() => None,
            permit = self.semaphore.clone().acquire_owned() => permit.ok(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[derive(Clone)]
pub struct PageFetcher {
    client: Arc<dyn NamingClient>,
    limiter: PageLimiter,
    cursor: Arc<Cursor>,
    stats: Arc<PipelineStats>,
    retry: RetryPolicy,
    page_size: u64,
    batches: mpsc::Sender<RecordBatch>,
    cancel: CancellationToken,
}

impl PageFetcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<dyn NamingClient>,
        limiter: PageLimiter,
        cursor: Arc<Cursor>,
        stats: Arc<PipelineStats>,
        retry: RetryPolicy,
        page_size: u64,
        batches: mpsc::Sender<RecordBatch>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            limiter,
            cursor,
            stats,
            retry,
            page_size: page_size.max(1),
            batches,
            cancel,
        }
    }

    /// Crawl every page of `namespace`. Returns once all page tasks have
    /// finished (or the run was cancelled).
    pub async fn fetch_namespace(&self, namespace: String) {
        let count = tokio::select! {
            _ = self.cancel.cancelled() => return,
            r = self.retry.run("get_num_names_in_namespace", || self.client.count_names(&namespace)) => r,
        };
        let count = match count {
            Ok(c) => c,
            Err(e) => {
                error!(namespace = %namespace, error = %e, "❌ Failed to count names, skipping namespace");
                self.stats.pages_failed(1);
                return;
            }
        };

        let pages = page_indices(count, self.page_size);
        info!(
            namespace = %namespace,
            names = count,
            pages = *pages.end() + 1,
            "🔍 Crawling namespace"
        );

        let mut tasks = Vec::with_capacity(*pages.end() as usize + 1);
        for page in pages {
            let Some(permit) = self.limiter.acquire(&self.cancel).await else {
                debug!(namespace = %namespace, page, "Cancelled while waiting for a page slot");
                break;
            };
            let this = self.clone();
            let ns = namespace.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                this.fetch_page(&ns, page).await;
            }));
        }

        for result in join_all(tasks).await {
            if let Err(e) = result {
                error!(namespace = %namespace, error = %e, "❌ Page task panicked");
            }
        }
        debug!(namespace = %namespace, "Namespace crawl finished");
    }

    async fn fetch_page(&self, namespace: &str, page: u64) {
        let offset = page * self.page_size;
        let listing = tokio::select! {
            _ = self.cancel.cancelled() => return,
            r = self.retry.run("get_names_in_namespace", || {
                self.client.list_names(namespace, offset, self.page_size)
            }) => r,
        };
        let listing = match listing {
            Ok(l) => l,
            Err(e) => {
                error!(namespace, page, offset, error = %e, "❌ Failed to list names, skipping page");
                self.stats.pages_failed(1);
                return;
            }
        };

        self.cursor.observe(listing.last_block);
        self.stats.pages_fetched(1);

        if listing.names.is_empty() {
            debug!(namespace, page, "Empty page");
            return;
        }

        let mut records = Vec::with_capacity(listing.names.len());
        for name in listing.names {
            let fetched = tokio::select! {
                _ = self.cancel.cancelled() => return,
                r = self.retry.run("get_name_blockchain_record", || {
                    self.client.get_blockchain_record(&name)
                }) => r,
            };

            let mut record = Record::new(name, namespace);
            match fetched {
                Ok(blockchain_record) => record.blockchain_record = Some(blockchain_record),
                Err(e) => {
                    warn!(name = record.name(), error = %e, "⚠️ Failed to fetch blockchain record, continuing without it");
                    self.stats.record_fetch_failures(1);
                }
            }
            self.stats.records_fetched(1);
            records.push(record);
        }

        let batch = RecordBatch {
            namespace: namespace.to_string(),
            page,
            records,
        };
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            sent = self.batches.send(batch) => {
                if sent.is_err() {
                    warn!(namespace, page, "Batch queue closed, page dropped");
                }
            }
        }
    }
}
