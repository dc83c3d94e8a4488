//! Prometheus metrics for the billing platform

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Histogram,
};

lazy_static! {
    /// Total bills issued
    pub static ref BILLS_ISSUED_TOTAL: Counter = register_counter!(
        "billing_bills_issued_total",
        "Total bills issued"
    )
    .unwrap();

    /// Redemption attempts by outcome
    pub static ref REDEMPTIONS_TOTAL: CounterVec = register_counter_vec!(
        "billing_redemptions_total",
        "Redemption attempts by outcome",
        &["outcome"]
    )
    .unwrap();

    /// Payment confirmations by outcome
    pub static ref CONFIRMATIONS_TOTAL: CounterVec = register_counter_vec!(
        "billing_confirmations_total",
        "Payment confirmations by outcome",
        &["outcome"]
    )
    .unwrap();

    /// Bills flipped to expired
    pub static ref BILLS_EXPIRED_TOTAL: Counter = register_counter!(
        "billing_bills_expired_total",
        "Bills flipped to expired by the sweeper or at redemption"
    )
    .unwrap();

    /// Settlements computed by payout method
    pub static ref SETTLEMENTS_TOTAL: CounterVec = register_counter_vec!(
        "billing_settlements_total",
        "Settlements computed by payout method",
        &["method"]
    )
    .unwrap();

    /// Confirmation apply duration
    pub static ref CONFIRMATION_APPLY_SECONDS: Histogram = register_histogram!(
        "billing_confirmation_apply_seconds",
        "Time to apply one payment confirmation"
    )
    .unwrap();
}
