//! # Indexer
//!
//! Wires the crawl together: lists namespaces, starts one page fetcher per
//! namespace, and runs the zone file, profile and persistence pools behind
//! them over bounded queues.
//!
//! ```text
//! namespaces ─▶ page fetchers ─[RecordBatch]─▶ zone files ─[Record]─▶ profiles ─[Record]─▶ persistence
//! ```
//!
//! Shutdown is by queue closure. Once every page fetcher has finished, the
//! batch queue closes; each pool drains its input, exits and closes the next
//! queue in turn. `run` returns after the persistence pool has drained.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::client::NamingClient;
use crate::cursor::Cursor;
use crate::error::IndexerError;
use crate::page_fetcher::{PageFetcher, PageLimiter};
use crate::pipeline::{shared, PersistStage, ProfileStage, ZonefileStage};
use crate::profile::ProfileResolver;
use crate::record::{Record, RecordBatch};
use crate::retry::RetryPolicy;
use crate::settings::{Pipeline, Settings};
use crate::stats::{report_periodically, PipelineStats, StatsSnapshot};
use crate::store::DocumentStore;

pub struct Indexer {
    client: Arc<dyn NamingClient>,
    resolver: Arc<dyn ProfileResolver>,
    store: Arc<dyn DocumentStore>,
    pipeline: Pipeline,
    retry: RetryPolicy,
    cursor: Arc<Cursor>,
    stats: Arc<PipelineStats>,
}

impl Indexer {
    pub fn new(
        settings: &Settings,
        client: Arc<dyn NamingClient>,
        resolver: Arc<dyn ProfileResolver>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            client,
            resolver,
            store,
            pipeline: settings.pipeline.clone(),
            retry: RetryPolicy::from(&settings.retry),
            cursor: Arc::new(Cursor::new()),
            stats: Arc::new(PipelineStats::new()),
        }
    }

    pub fn cursor(&self) -> Arc<Cursor> {
        self.cursor.clone()
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    /// Crawl every namespace once.
    ///
    /// Per-page and per-record failures are logged and counted; only a failed
    /// namespace listing fails the run. A cancelled run stops its workers at
    /// their next wait and returns the counters reached so far.
    pub async fn run(&self, cancel: CancellationToken) -> Result<StatsSnapshot, IndexerError> {
        let p = &self.pipeline;
        let capacity = p.queue_capacity.max(1);
        let (batch_tx, batch_rx) = mpsc::channel::<RecordBatch>(capacity);
        let (record_tx, record_rx) = mpsc::channel::<Record>(capacity);
        let (resolved_tx, resolved_rx) = mpsc::channel::<Record>(capacity);

        let zonefile_stage = Arc::new(ZonefileStage::new(
            self.client.clone(),
            self.cursor.clone(),
            self.stats.clone(),
            self.retry,
            cancel.clone(),
        ));
        let batch_rx = shared(batch_rx);
        let zonefile_workers: Vec<JoinHandle<()>> = (0..p.zonefile_workers.max(1))
            .map(|id| {
                tokio::spawn(
                    zonefile_stage
                        .clone()
                        .run(id, batch_rx.clone(), record_tx.clone()),
                )
            })
            .collect();
        drop(record_tx);

        let profile_stage = Arc::new(ProfileStage::new(
            self.resolver.clone(),
            self.stats.clone(),
            cancel.clone(),
        ));
        let record_rx = shared(record_rx);
        let profile_workers: Vec<JoinHandle<()>> = (0..p.profile_workers.max(1))
            .map(|id| {
                tokio::spawn(
                    profile_stage
                        .clone()
                        .run(id, record_rx.clone(), resolved_tx.clone()),
                )
            })
            .collect();
        drop(resolved_tx);

        let persist_stage = Arc::new(PersistStage::new(
            self.store.clone(),
            self.cursor.clone(),
            self.stats.clone(),
            cancel.clone(),
        ));
        let resolved_rx = shared(resolved_rx);
        let persist_workers: Vec<JoinHandle<()>> = (0..p.persist_workers.max(1))
            .map(|id| tokio::spawn(persist_stage.clone().run(id, resolved_rx.clone())))
            .collect();

        let reporter_stop = cancel.child_token();
        let reporter = tokio::spawn(report_periodically(
            self.stats.clone(),
            self.cursor.clone(),
            Duration::from_secs(p.stats_interval_seconds.max(1)),
            reporter_stop.clone(),
        ));

        info!(
            page_size = p.page_size,
            page_fetch_concurrency = p.page_fetch_concurrency,
            zonefile_workers = p.zonefile_workers,
            profile_workers = p.profile_workers,
            persist_workers = p.persist_workers,
            "🚀 Starting crawl"
        );

        let listing = tokio::select! {
            _ = cancel.cancelled() => Err(IndexerError::Cancelled),
            r = self.retry.run("get_all_namespaces", || self.client.list_namespaces()) => {
                r.map_err(IndexerError::ListNamespaces)
            }
        };
        let listing = match listing {
            Ok(l) => l,
            Err(e) => {
                error!(error = %e, "❌ Crawl aborted");
                drop(batch_tx);
                drain("zone file", zonefile_workers).await;
                drain("profile", profile_workers).await;
                drain("persistence", persist_workers).await;
                reporter_stop.cancel();
                let _ = reporter.await;
                return Err(e);
            }
        };

        self.cursor.observe(listing.last_block);
        info!(
            namespaces = listing.namespaces.len(),
            last_block = listing.last_block,
            "📋 Namespaces listed"
        );

        let fetcher = PageFetcher::new(
            self.client.clone(),
            PageLimiter::new(p.page_fetch_concurrency),
            self.cursor.clone(),
            self.stats.clone(),
            self.retry,
            p.page_size,
            batch_tx,
            cancel.clone(),
        );
        let namespace_tasks: Vec<JoinHandle<()>> = listing
            .namespaces
            .into_iter()
            .map(|namespace| {
                let fetcher = fetcher.clone();
                tokio::spawn(async move { fetcher.fetch_namespace(namespace).await })
            })
            .collect();
        // Page tasks hold the remaining senders; the batch queue closes when they finish
        drop(fetcher);

        drain("namespace", namespace_tasks).await;
        drain("zone file", zonefile_workers).await;
        drain("profile", profile_workers).await;
        drain("persistence", persist_workers).await;

        reporter_stop.cancel();
        let _ = reporter.await;

        let snapshot = self.stats.snapshot();
        if cancel.is_cancelled() {
            warn!(cursor = self.cursor.get(), "🛑 Crawl cancelled");
        }
        info!(
            cursor = self.cursor.get(),
            pages = snapshot.pages_fetched,
            pages_failed = snapshot.pages_failed,
            fetched = snapshot.records_fetched,
            zonefiles = snapshot.zonefiles_fetched,
            with_profile = snapshot.with_profile,
            persisted = snapshot.persisted,
            persist_failures = snapshot.persist_failures,
            "✅ Crawl finished"
        );
        Ok(snapshot)
    }
}

async fn drain(pool: &str, handles: Vec<JoinHandle<()>>) {
    for result in join_all(handles).await {
        if let Err(e) = result {
            error!(pool, error = %e, "❌ Worker task failed");
        }
    }
}
