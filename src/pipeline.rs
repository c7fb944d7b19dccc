//! # Stage Workers
//!
//! The three worker pools that sit behind the page fetchers:
//!
//! - **Zone files**: one bulk zone file fetch per `RecordBatch`, then records
//!   are forwarded one by one.
//! - **Profiles**: resolves the profile for records whose zone file carries a
//!   profile marker.
//! - **Persistence**: validates and writes each record as a document.
//!
//! Workers of one pool share a single receiver behind a mutex. A worker exits
//! when its input queue is closed and drained, or when the run is cancelled;
//! the pool's output queue closes once every worker of the pool has exited
//! and dropped its sender.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::client::NamingClient;
use crate::cursor::Cursor;
use crate::error::{ProfileError, StoreError};
use crate::profile::{Profile, ProfileResolver};
use crate::record::{Record, RecordBatch, RecordDocument};
use crate::retry::RetryPolicy;
use crate::stats::PipelineStats;
use crate::store::DocumentStore;
use crate::zonefile::Zonefile;

/// Receiver shared by every worker of a pool.
pub type SharedReceiver<T> = Arc<Mutex<mpsc::Receiver<T>>>;

pub fn shared<T>(rx: mpsc::Receiver<T>) -> SharedReceiver<T> {
    Arc::new(Mutex::new(rx))
}

async fn next_item<T>(rx: &SharedReceiver<T>, cancel: &CancellationToken) -> Option<T> {
    let mut guard = tokio::select! {
        _ = cancel.cancelled() => return None,
        guard = rx.lock() => guard,
    };
    tokio::select! {
        _ = cancel.cancelled() => None,
        item = guard.recv() => item,
    }
}

/// Hand `item` to the next stage. `false` when the run was cancelled or the
/// downstream pool is gone.
async fn forward<T>(tx: &mpsc::Sender<T>, item: T, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        sent = tx.send(item) => sent.is_ok(),
    }
}

pub struct ZonefileStage {
    client: Arc<dyn NamingClient>,
    cursor: Arc<Cursor>,
    stats: Arc<PipelineStats>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl ZonefileStage {
    pub fn new(
        client: Arc<dyn NamingClient>,
        cursor: Arc<Cursor>,
        stats: Arc<PipelineStats>,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            cursor,
            stats,
            retry,
            cancel,
        }
    }

    pub async fn run(
        self: Arc<Self>,
        worker: usize,
        batches: SharedReceiver<RecordBatch>,
        records: mpsc::Sender<Record>,
    ) {
        debug!(worker, "Zone file worker started");
        while let Some(batch) = next_item(&batches, &self.cancel).await {
            if !self.process(batch, &records).await {
                break;
            }
        }
        debug!(worker, "Zone file worker stopped");
    }

    async fn process(&self, batch: RecordBatch, out: &mpsc::Sender<Record>) -> bool {
        let hashes = batch.zonefile_hashes();
        let mut zonefiles: HashMap<String, Zonefile> = HashMap::new();

        if !hashes.is_empty() {
            let fetched = tokio::select! {
                _ = self.cancel.cancelled() => return false,
                r = self.retry.run("get_zonefiles", || self.client.get_zonefiles(&hashes)) => r,
            };
            match fetched {
                Ok(response) => {
                    self.cursor.observe(response.last_block);
                    self.stats.zonefiles_fetched(response.zonefiles.len() as u64);
                    zonefiles = response.zonefiles.decode();
                }
                Err(e) => {
                    error!(
                        namespace = %batch.namespace,
                        page = batch.page,
                        records = batch.records.len(),
                        error = %e,
                        "❌ Bulk zone file fetch failed, dropping batch"
                    );
                    for record in &batch.records {
                        debug!(name = record.name(), "Dropped with failed batch");
                    }
                    self.stats.batches_dropped(1);
                    self.stats.records_dropped(batch.records.len() as u64);
                    return true;
                }
            }
        }

        for mut record in batch.records {
            let zonefile = record
                .zonefile_hash()
                .and_then(|hash| zonefiles.get(hash).cloned());
            record.zonefile = zonefile;

            if !forward(out, record, &self.cancel).await {
                return false;
            }
            self.stats.sent_to_resolve(1);
        }
        true
    }
}

pub struct ProfileStage {
    resolver: Arc<dyn ProfileResolver>,
    stats: Arc<PipelineStats>,
    cancel: CancellationToken,
}

impl ProfileStage {
    pub fn new(
        resolver: Arc<dyn ProfileResolver>,
        stats: Arc<PipelineStats>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            resolver,
            stats,
            cancel,
        }
    }

    pub async fn run(
        self: Arc<Self>,
        worker: usize,
        records: SharedReceiver<Record>,
        resolved: mpsc::Sender<Record>,
    ) {
        debug!(worker, "Profile worker started");
        while let Some(mut record) = next_item(&records, &self.cancel).await {
            match self.resolve(&record).await {
                Some(Ok(Some(profile))) => {
                    record.profile = Some(profile);
                    self.stats.with_profile(1);
                }
                Some(Ok(None)) | None => {}
                Some(Err(e)) => {
                    warn!(name = record.name(), error = %e, "⚠️ Profile resolution failed, continuing without profile");
                    self.stats.profile_failures(1);
                }
            }

            if !forward(&resolved, record, &self.cancel).await {
                break;
            }
            self.stats.resolved(1);
        }
        debug!(worker, "Profile worker stopped");
    }

    /// `None` when the record has no profile marker.
    async fn resolve(&self, record: &Record) -> Option<Result<Option<Profile>, ProfileError>> {
        record.profile_marker()?;
        let zonefile = record.zonefile.as_ref()?;
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            r = self.resolver.resolve(zonefile) => Some(r),
        }
    }
}

pub struct PersistStage {
    store: Arc<dyn DocumentStore>,
    cursor: Arc<Cursor>,
    stats: Arc<PipelineStats>,
    cancel: CancellationToken,
}

impl PersistStage {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cursor: Arc<Cursor>,
        stats: Arc<PipelineStats>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            cursor,
            stats,
            cancel,
        }
    }

    pub async fn run(self: Arc<Self>, worker: usize, records: SharedReceiver<Record>) {
        debug!(worker, "Persistence worker started");
        while let Some(record) = next_item(&records, &self.cancel).await {
            if let Some(profile) = &record.profile {
                if let Err(e) = profile.validate() {
                    warn!(name = record.name(), error = %e, "⚠️ Profile failed validation, record not persisted");
                    self.stats.validation_failures(1);
                    continue;
                }
            }

            let document = record.into_document(self.cursor.get());
            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => break,
                r = self.write(&document) => r,
            };
            match outcome {
                Ok(()) => self.stats.persisted(1),
                Err(e) => {
                    error!(name = %document.name, error = %e, "❌ Failed to persist record");
                    self.stats.persist_failures(1);
                }
            }
        }
        debug!(worker, "Persistence worker stopped");
    }

    /// The collection handle lives only for this call.
    async fn write(&self, document: &RecordDocument) -> Result<(), StoreError> {
        let mut handle = self.store.acquire().await?;
        handle.upsert(document).await
    }
}
