// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
    increment_counter, Unit,
};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
pub enum Unit {
    Count,
    Seconds,
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = &$name;
        let _ = &$value;
        $( let _ = &$label_value; )*
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = &$name;
        let _ = &$value;
        $( let _ = &$label_value; )*
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = &$name;
        let _ = &$value;
        $( let _ = &$label_value; )*
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! increment_counter {
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = &$name;
        $( let _ = &$label_value; )*
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
use crate::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
    increment_counter,
};

/// Initializes the descriptions for all the metrics in the application.
/// This should be called once at startup.
pub fn describe_metrics() {
    describe_gauge!(
        "bns_indexer_cursor_block",
        "Highest block height reported by the naming service."
    );
    describe_counter!(
        "bns_indexer_pages_fetched_total",
        Unit::Count,
        "Name pages listed from the naming service."
    );
    describe_counter!(
        "bns_indexer_pages_failed_total",
        Unit::Count,
        "Name pages (or namespaces) skipped after exhausting retries."
    );
    describe_counter!(
        "bns_indexer_records_fetched_total",
        Unit::Count,
        "Blockchain records requested, successful or not."
    );
    describe_counter!(
        "bns_indexer_record_fetch_failures_total",
        Unit::Count,
        "Blockchain record requests that failed after retries."
    );
    describe_counter!(
        "bns_indexer_zonefiles_fetched_total",
        Unit::Count,
        "Zone files returned by bulk fetches."
    );
    describe_counter!(
        "bns_indexer_batches_dropped_total",
        Unit::Count,
        "Page batches dropped because the bulk zone file fetch failed."
    );
    describe_counter!(
        "bns_indexer_records_dropped_total",
        Unit::Count,
        "Records discarded together with a dropped batch."
    );
    describe_counter!(
        "bns_indexer_sent_to_resolve_total",
        Unit::Count,
        "Records forwarded to profile resolution."
    );
    describe_counter!(
        "bns_indexer_with_profile_total",
        Unit::Count,
        "Records with a resolved profile."
    );
    describe_counter!(
        "bns_indexer_profile_failures_total",
        Unit::Count,
        "Profile resolutions that returned an error."
    );
    describe_counter!(
        "bns_indexer_resolved_total",
        Unit::Count,
        "Records forwarded to persistence."
    );
    describe_counter!(
        "bns_indexer_validation_failures_total",
        Unit::Count,
        "Records dropped because their profile failed validation."
    );
    describe_counter!(
        "bns_indexer_persisted_total",
        Unit::Count,
        "Records written to the document store."
    );
    describe_counter!(
        "bns_indexer_persist_failures_total",
        Unit::Count,
        "Document store writes that failed."
    );
    describe_histogram!(
        "bns_indexer_upstream_call_seconds",
        Unit::Seconds,
        "Naming service call latency, labeled by method."
    );
    describe_counter!(
        "bns_indexer_upstream_errors_total",
        Unit::Count,
        "Naming service call errors, labeled by method."
    );
}

pub fn increment_stat(name: &'static str, value: u64) {
    counter!(name, value);
}

pub fn set_cursor_block(block: u64) {
    gauge!("bns_indexer_cursor_block", block as f64);
}

pub fn record_upstream_call(method: &'static str, duration: std::time::Duration, success: bool) {
    histogram!(
        "bns_indexer_upstream_call_seconds",
        duration.as_secs_f64(),
        "method" => method
    );
    if !success {
        increment_counter!("bns_indexer_upstream_errors_total", "method" => method);
    }
}
