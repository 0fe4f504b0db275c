//! Prometheus metrics for the price voter.
//!
//! Covers the full commit-reveal pipeline:
//! - Price sourcing (fresh source counts, feed reconnects)
//! - Submission outcomes (commits, reveals, failures by class)
//! - Integrity (local record vs. on-chain reveal divergence)
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_int_counter, register_int_gauge,
    CounterVec, GaugeVec, IntCounter, IntGauge,
};

/// Commits handed to the transaction queue, per asset symbol.
pub static COMMITS_SUBMITTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "voter_commits_submitted_total",
        "Total commitment hashes handed to the transaction queue",
        &["symbol"]
    )
    .unwrap()
});

/// Reveals handed to the transaction queue, per asset symbol.
pub static REVEALS_SUBMITTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "voter_reveals_submitted_total",
        "Total price reveals handed to the transaction queue",
        &["symbol"]
    )
    .unwrap()
});

/// Transactions that reached finalization, per action label.
pub static TX_FINALIZED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "voter_tx_finalized_total",
        "Total transactions confirmed on chain",
        &["action"]
    )
    .unwrap()
});

/// Transaction failures by class (revert/finalize_timeout/transport/other).
pub static TX_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "voter_tx_failures_total",
        "Total transaction failures by class",
        &["class"]
    )
    .unwrap()
});

/// Reveals observed on chain that diverged from the local record.
pub static INTEGRITY_MISMATCHES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "voter_integrity_mismatches_total",
        "Total on-chain reveals diverging from the local commit record"
    )
    .unwrap()
});

/// Epochs skipped because no price was available, per asset symbol.
pub static EPOCHS_SKIPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "voter_epochs_skipped_total",
        "Total epochs skipped per asset for lack of a usable price",
        &["symbol"]
    )
    .unwrap()
});

/// Most recent epoch the scheduler started working on.
pub static CURRENT_EPOCH: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "voter_current_epoch",
        "Most recent submit epoch the scheduler started"
    )
    .unwrap()
});

/// Fresh push sources per asset at the last price build.
pub static FRESH_SOURCES: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "voter_fresh_sources",
        "Fresh push sources per asset at the last price build",
        &["symbol"]
    )
    .unwrap()
});

/// Metrics facade for common recording patterns.
pub struct Metrics;

impl Metrics {
    /// Record a commit handed to the transaction queue.
    pub fn commit_submitted(symbol: &str) {
        COMMITS_SUBMITTED_TOTAL.with_label_values(&[symbol]).inc();
    }

    /// Record a reveal handed to the transaction queue.
    pub fn reveal_submitted(symbol: &str) {
        REVEALS_SUBMITTED_TOTAL.with_label_values(&[symbol]).inc();
    }

    /// Record an epoch skipped for one asset.
    pub fn epoch_skipped(symbol: &str) {
        EPOCHS_SKIPPED_TOTAL.with_label_values(&[symbol]).inc();
    }

    /// Update the current epoch gauge.
    pub fn current_epoch(epoch: u64) {
        CURRENT_EPOCH.set(epoch as i64);
    }

    /// Update the fresh source count for one asset.
    pub fn fresh_sources(symbol: &str, count: usize) {
        FRESH_SOURCES.with_label_values(&[symbol]).set(count as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_once() {
        // Touching every static verifies no duplicate registrations.
        Metrics::commit_submitted("XRP");
        Metrics::reveal_submitted("XRP");
        Metrics::epoch_skipped("XRP");
        Metrics::current_epoch(1234);
        Metrics::fresh_sources("XRP", 2);
        TX_FINALIZED_TOTAL.with_label_values(&["submit_price_hashes"]).inc();
        TX_FAILURES_TOTAL.with_label_values(&["revert"]).inc();
        INTEGRITY_MISMATCHES_TOTAL.inc();

        assert!(CURRENT_EPOCH.get() >= 0);
    }
}
