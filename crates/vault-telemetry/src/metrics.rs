//! Prometheus metrics for the holdings client.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`: a registration failure means
//! duplicate metric names, a startup bug. It can only happen during static
//! initialization.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram, register_int_gauge, register_int_gauge_vec,
    CounterVec, Encoder, Histogram, IntGauge, IntGaugeVec, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Source list fetches by stream and outcome.
/// Labels: stream (purchases/delivery_orders/consignments), outcome (ok/unavailable)
pub static SOURCE_FETCH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vault_source_fetch_total",
        "Source list fetches by stream and outcome",
        &["stream", "outcome"]
    )
    .unwrap()
});

/// Wall time of one page load (fetch + reconcile + evaluate).
pub static PAGE_LOAD_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "vault_page_load_ms",
        "Page load latency in milliseconds",
        vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    )
    .unwrap()
});

/// Holdings on the current page, by derived display status.
pub static HOLDINGS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "vault_holdings",
        "Holdings on the last loaded page by display status",
        &["status"]
    )
    .unwrap()
});

/// Reconciliation diagnostics.
/// Labels: kind (unresolved_purchase/unresolved_source_record/duplicate_holding/
/// unrecognized_status/source_unavailable)
pub static DIAGNOSTICS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vault_reconcile_diagnostics_total",
        "Reconciliation diagnostics by kind",
        &["kind"]
    )
    .unwrap()
});

/// Status values the normalizer did not recognize.
pub static UNRECOGNIZED_STATUS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vault_unrecognized_status_total",
        "Unrecognized raw status values by field",
        &["field"]
    )
    .unwrap()
});

/// Actions rejected locally by the eligibility gate.
pub static GATE_DENIED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vault_gate_denied_total",
        "Actions denied by the eligibility gate",
        &["action", "reason"]
    )
    .unwrap()
});

/// Submitted mutations by action and outcome.
/// Labels: action (deliver/consign), outcome (ok/rejected/transport)
pub static ACTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vault_actions_total",
        "Submitted deliver/consign mutations by outcome",
        &["action", "outcome"]
    )
    .unwrap()
});

/// Consignment coupon balance as last reported.
pub static COUPONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("vault_coupons", "Consignment coupon balance").unwrap()
});

/// Running countdown timers (0 or 1 per open panel).
pub static COUNTDOWNS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("vault_countdowns_active", "Running holding-period countdowns").unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    pub fn source_fetched(stream: &str) {
        SOURCE_FETCH_TOTAL.with_label_values(&[stream, "ok"]).inc();
    }

    pub fn source_unavailable(stream: &str) {
        SOURCE_FETCH_TOTAL
            .with_label_values(&[stream, "unavailable"])
            .inc();
    }

    pub fn page_loaded(elapsed_ms: f64) {
        PAGE_LOAD_MS.observe(elapsed_ms);
    }

    /// Replace the per-status holding counts with `counts`.
    pub fn holdings_set(counts: &[(&str, i64)]) {
        HOLDINGS.reset();
        for (status, count) in counts {
            HOLDINGS.with_label_values(&[*status]).set(*count);
        }
    }

    pub fn diagnostic(kind: &str) {
        DIAGNOSTICS_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn unrecognized_status(field: &str) {
        UNRECOGNIZED_STATUS_TOTAL.with_label_values(&[field]).inc();
    }

    pub fn gate_denied(action: &str, reason: &str) {
        GATE_DENIED_TOTAL.with_label_values(&[action, reason]).inc();
    }

    pub fn action_submitted(action: &str, outcome: &str) {
        ACTIONS_TOTAL.with_label_values(&[action, outcome]).inc();
    }

    pub fn coupons_set(count: u32) {
        COUPONS.set(i64::from(count));
    }

    pub fn countdown_started() {
        COUNTDOWNS_ACTIVE.inc();
    }

    pub fn countdown_stopped() {
        COUNTDOWNS_ACTIVE.dec();
    }
}

/// Render the default registry in the Prometheus text format.
pub fn gather_text() -> TelemetryResult<String> {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&families, &mut buffer)
        .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
}
