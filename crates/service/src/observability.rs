use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec, TextEncoder,
};

// Prometheus metrics (default registry)
pub static REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "prefs_requests_total",
        "Bus requests handled, by category",
        &["category"]
    )
    .expect("register requests_total")
});

pub static AUTH_DECISIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "prefs_auth_decisions_total",
        "Authorization checks by outcome",
        &["outcome"]
    )
    .expect("register auth_decisions_total")
});

pub static BACKUP_ROWS_WRITTEN: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "prefs_backup_rows_written_total",
        "Rows merged into backup snapshots"
    )
    .expect("register backup_rows_written_total")
});

pub static BACKUP_ROWS_SKIPPED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "prefs_backup_rows_skipped_total",
        "Rows rejected while merging backup snapshots"
    )
    .expect("register backup_rows_skipped_total")
});

pub static RESTORE_ROWS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "prefs_restore_rows_total",
        "Rows replayed into application stores by restore"
    )
    .expect("register restore_rows_total")
});

/// Render the default registry in the text exposition format.
pub fn encode_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("metrics encode error: {e}"))?;
    String::from_utf8(buffer).map_err(|e| e.to_string())
}
