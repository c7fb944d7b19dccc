//! Throughput counters shared by every pipeline stage.
//!
//! Counters are monotonic and monitoring-only: nothing in the pipeline reads
//! them to make a decision. Each increment is mirrored to the metrics
//! recorder when the `observability` feature is enabled.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cursor::Cursor;
use crate::metrics;

macro_rules! pipeline_counters {
    ($( $(#[$doc:meta])* $field:ident => $metric:literal ),+ $(,)?) => {
        #[derive(Debug, Default)]
        pub struct PipelineStats {
            $( $field: AtomicU64, )+
        }

        /// Point-in-time copy of every counter.
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
        pub struct StatsSnapshot {
            $( $(#[$doc])* pub $field: u64, )+
        }

        impl PipelineStats {
            pub fn new() -> Self {
                Self::default()
            }

            $(
                $(#[$doc])*
                pub fn $field(&self, value: u64) {
                    if value == 0 {
                        return;
                    }
                    self.$field.fetch_add(value, Ordering::Relaxed);
                    metrics::increment_stat($metric, value);
                }
            )+

            pub fn snapshot(&self) -> StatsSnapshot {
                StatsSnapshot {
                    $( $field: self.$field.load(Ordering::Relaxed), )+
                }
            }
        }
    };
}

pipeline_counters! {
    /// Name pages listed (including empty boundary pages).
    pages_fetched => "bns_indexer_pages_fetched_total",
    /// Pages or namespaces skipped after the listing failed.
    pages_failed => "bns_indexer_pages_failed_total",
    /// Records created from listed names; counted whether or not the
    /// blockchain record could be fetched.
    records_fetched => "bns_indexer_records_fetched_total",
    record_fetch_failures => "bns_indexer_record_fetch_failures_total",
    zonefiles_fetched => "bns_indexer_zonefiles_fetched_total",
    batches_dropped => "bns_indexer_batches_dropped_total",
    records_dropped => "bns_indexer_records_dropped_total",
    /// Records handed to the profile stage.
    sent_to_resolve => "bns_indexer_sent_to_resolve_total",
    with_profile => "bns_indexer_with_profile_total",
    profile_failures => "bns_indexer_profile_failures_total",
    /// Records handed to the persistence stage.
    resolved => "bns_indexer_resolved_total",
    validation_failures => "bns_indexer_validation_failures_total",
    persisted => "bns_indexer_persisted_total",
    persist_failures => "bns_indexer_persist_failures_total",
}

/// Log a snapshot every `every` until `cancel` fires.
pub async fn report_periodically(
    stats: Arc<PipelineStats>,
    cursor: Arc<Cursor>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    // First tick completes immediately
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let s = stats.snapshot();
                info!(
                    cursor = cursor.get(),
                    pages = s.pages_fetched,
                    fetched = s.records_fetched,
                    zonefiles = s.zonefiles_fetched,
                    sent_to_resolve = s.sent_to_resolve,
                    with_profile = s.with_profile,
                    resolved = s.resolved,
                    persisted = s.persisted,
                    "📊 Indexer progress"
                );
            }
        }
    }
}
