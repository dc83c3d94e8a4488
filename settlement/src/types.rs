//! Settlement API types

use billing_core::{Amount, SettlementMode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a settlement pass produced for one merchant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementSummary {
    /// The statement written by this pass
    pub settlement_id: Uuid,
    /// Merchant the statement pays
    pub merchant_id: Uuid,

    /// Sum of the merchant's share over the included orders
    pub payable_total: Amount,

    /// Orders rolled into this settlement
    pub order_count: usize,

    /// How the payout will be executed
    pub payout_method: SettlementMode,

    /// A Direct-configured merchant was paid platform-managed instead
    pub fallback_applied: bool,
}

/// Outcome of one scheduler pass
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerReport {
    /// Merchants examined
    pub merchants: usize,

    /// Settlements created
    pub settled: usize,

    /// Merchants with nothing to settle
    pub empty: usize,

    /// Merchants whose settlement failed
    pub failed: usize,
}
