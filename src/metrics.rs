//! This module provides API to register and report beacon metrics.
//!
//! No exporter is installed here; the embedding node decides where the
//! recorder ships its data. Without a recorder every call is a no-op.

use metrics::{counter, describe_counter, describe_gauge, gauge};

pub fn register_metrics() {
    describe_counter!(
        "entropy_share_dropped",
        "Entropy shares rejected during ingestion, labelled by reason"
    );

    describe_counter!(
        "computed_entropy_dropped",
        "Computed entropies rejected during ingestion, labelled by reason"
    );

    describe_gauge!(
        "entropy_last_computed_height",
        "Highest height with a combined group signature"
    );

    describe_gauge!("entropy_group_size", "Number of validators in the current aeon");

    describe_gauge!(
        "entropy_group_threshold",
        "Number of shares needed for group signature combination"
    );
}

#[inline(always)]
/// Entropy share rejected during ingestion.
pub fn share_dropped(reason: &'static str) {
    counter!("entropy_share_dropped", "reason" => reason).increment(1);
}

#[inline(always)]
/// Computed entropy rejected during ingestion.
pub fn computed_entropy_dropped(reason: &'static str) {
    counter!("computed_entropy_dropped", "reason" => reason).increment(1);
}

#[inline(always)]
/// Highest height with a combined group signature.
pub fn last_computed_height(value: u64) {
    gauge!("entropy_last_computed_height").set(value as f64);
}

/// Helper to report group metrics once a new aeon becomes active.
pub fn report_metrics_on_aeon(group_size: usize, threshold: usize) {
    gauge!("entropy_group_size").set(group_size as f64);
    gauge!("entropy_group_threshold").set(threshold as f64);
}
