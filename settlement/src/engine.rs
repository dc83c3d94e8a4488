//! Settlement engine.
//!
//! Rolls a merchant's settlement-pending orders into one Settlement
//! statement per period. Periods for the same merchant are serialized
//! through a per-merchant mutex, and the store attaches each order to
//! at most one settlement, so an order can never be paid out twice.

use crate::error::{Error, Result};
use crate::types::SettlementSummary;
use billing_core::metrics::SETTLEMENTS_TOTAL;
use billing_core::{Amount, Settlement, SettlementMode, SettlementStatus, Storage};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Computes per-merchant settlements over paid orders
pub struct SettlementEngine {
    storage: Arc<Storage>,

    /// One guard per merchant so concurrent passes never interleave
    merchant_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl SettlementEngine {
    /// Create an engine over the shared store
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            merchant_locks: DashMap::new(),
        }
    }

    fn merchant_lock(&self, merchant_id: Uuid) -> Arc<Mutex<()>> {
        self.merchant_locks.entry(merchant_id).or_default().clone()
    }

    /// Settle one merchant's period.
    ///
    /// Collects every settlement-pending order paid before the period
    /// end; there is no lower bound, so orders an earlier pass missed
    /// are swept up instead of orphaned. The payout method is decided
    /// from the merchant's eligibility at computation time: a merchant
    /// configured for direct payout whose eligibility is revoked falls
    /// back to platform-managed, flagged on the statement.
    pub async fn compute_settlement(
        &self,
        merchant_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<SettlementSummary> {
        if period_end <= period_start {
            return Err(Error::InvalidPeriod);
        }
        let lock = self.merchant_lock(merchant_id);
        let _guard = lock.lock().await;

        let merchant = self.storage.get_merchant(merchant_id)?;
        let orders = self.storage.unsettled_orders(merchant_id, period_end)?;
        if orders.is_empty() {
            return Err(Error::NothingToSettle { merchant_id });
        }

        let payable_total: Amount = orders.iter().map(|o| o.merchant_net()).sum();
        let wants_direct = merchant.settlement_mode == SettlementMode::Direct;
        let payout_method = if wants_direct && merchant.direct_payout_eligible() {
            SettlementMode::Direct
        } else {
            SettlementMode::PlatformManaged
        };
        let fallback_applied = wants_direct && payout_method == SettlementMode::PlatformManaged;

        let now = Utc::now();
        let settlement = Settlement {
            settlement_id: Uuid::now_v7(),
            merchant_id,
            period_start,
            period_end,
            order_ids: orders.iter().map(|o| o.order_id).collect(),
            payable_total,
            payout_method,
            fallback_applied,
            status: SettlementStatus::Pending,
            payout_reference: None,
            created_at: now,
            paid_at: None,
        };
        self.storage.create_settlement(&settlement)?;

        let method = match payout_method {
            SettlementMode::Direct => "direct",
            SettlementMode::PlatformManaged => "platform_managed",
        };
        SETTLEMENTS_TOTAL.with_label_values(&[method]).inc();
        info!(
            settlement_id = %settlement.settlement_id,
            merchant_id = %merchant_id,
            orders = settlement.order_count(),
            total = %payable_total,
            method = method,
            fallback = fallback_applied,
            "Settlement computed"
        );

        Ok(SettlementSummary {
            settlement_id: settlement.settlement_id,
            merchant_id,
            payable_total,
            order_count: settlement.order_count(),
            payout_method,
            fallback_applied,
        })
    }

    /// Record the executed payout for a pending settlement
    pub fn mark_paid(&self, settlement_id: Uuid, payout_reference: &str) -> Result<Settlement> {
        let settlement =
            self.storage
                .mark_settlement_paid(settlement_id, payout_reference, Utc::now())?;
        info!(
            settlement_id = %settlement_id,
            reference = payout_reference,
            "Settlement paid out"
        );
        Ok(settlement)
    }

    /// All settlements for a merchant, oldest first
    pub fn settlements_for(&self, merchant_id: Uuid) -> Result<Vec<Settlement>> {
        Ok(self.storage.settlements_by_merchant(merchant_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_core::{DiscountRate, MerchantDirectory, StoreConfig};
    use chrono::Duration;

    fn open_storage() -> (tempfile::TempDir, Arc<Storage>) {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            data_dir: dir.path().join("db"),
            ..StoreConfig::default()
        };
        let storage = Arc::new(Storage::open(&config).unwrap());
        (dir, storage)
    }

    #[tokio::test]
    async fn test_empty_period_reports_nothing_to_settle() {
        let (_dir, storage) = open_storage();
        let directory = MerchantDirectory::new(storage.clone());
        let merchant = directory
            .register(
                "Cafe Aurora",
                DiscountRate::new(5).unwrap(),
                SettlementMode::PlatformManaged,
            )
            .unwrap();

        let engine = SettlementEngine::new(storage);
        let now = Utc::now();
        let result = engine
            .compute_settlement(merchant.merchant_id, now - Duration::hours(24), now)
            .await;
        assert!(matches!(result, Err(Error::NothingToSettle { .. })));
    }

    #[tokio::test]
    async fn test_inverted_period_rejected() {
        let (_dir, storage) = open_storage();
        let engine = SettlementEngine::new(storage);
        let now = Utc::now();
        let result = engine
            .compute_settlement(Uuid::new_v4(), now, now)
            .await;
        assert!(matches!(result, Err(Error::InvalidPeriod)));
    }

    #[tokio::test]
    async fn test_unknown_merchant_rejected() {
        let (_dir, storage) = open_storage();
        let engine = SettlementEngine::new(storage);
        let now = Utc::now();
        let result = engine
            .compute_settlement(Uuid::new_v4(), now - Duration::hours(24), now)
            .await;
        assert!(matches!(
            result,
            Err(Error::Core(billing_core::Error::MerchantNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_unknown_settlement_cannot_be_paid() {
        let (_dir, storage) = open_storage();
        let engine = SettlementEngine::new(storage);
        let result = engine.mark_paid(Uuid::new_v4(), "payout-1");
        assert!(matches!(
            result,
            Err(Error::Core(billing_core::Error::UnknownSettlement(_)))
        ));
    }
}
