//! Merchant directory and compliance transitions
//!
//! Merchants register as PendingReview and must be Verified before any
//! bill can be issued for them. Suspension blocks issuance immediately
//! and race-free: the store re-checks eligibility inside the issuance
//! transaction, so a bill and a suspension cannot both win.

use crate::error::{Error, Result};
use crate::storage::Storage;
use crate::types::{ComplianceStatus, DiscountRate, Merchant, SettlementMode};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Administrative interface over the merchant column family
pub struct MerchantDirectory {
    storage: Arc<Storage>,
}

impl MerchantDirectory {
    /// Create a directory over the shared store
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Register a new merchant, awaiting review
    pub fn register(
        &self,
        display_name: impl Into<String>,
        discount_rate: DiscountRate,
        settlement_mode: SettlementMode,
    ) -> Result<Merchant> {
        let now = Utc::now();
        let merchant = Merchant {
            merchant_id: Uuid::new_v4(),
            display_name: display_name.into(),
            discount_rate,
            settlement_mode,
            payout_account: None,
            compliance_status: ComplianceStatus::PendingReview,
            direct_payout_ok: true,
            created_at: now,
            updated_at: now,
        };
        self.storage.put_merchant(&merchant)?;

        tracing::info!(
            merchant_id = %merchant.merchant_id,
            display_name = %merchant.display_name,
            rate = %discount_rate,
            "Merchant registered"
        );
        Ok(merchant)
    }

    /// Get merchant by ID
    pub fn get(&self, merchant_id: Uuid) -> Result<Merchant> {
        self.storage.get_merchant(merchant_id)
    }

    /// Approve a merchant under review
    pub fn mark_verified(&self, merchant_id: Uuid) -> Result<Merchant> {
        let merchant = self.storage.update_merchant(merchant_id, |m| {
            if m.compliance_status != ComplianceStatus::PendingReview {
                return Err(Error::Other(format!(
                    "Cannot verify merchant in {:?}",
                    m.compliance_status
                )));
            }
            m.compliance_status = ComplianceStatus::Verified;
            Ok(())
        })?;
        tracing::info!(merchant_id = %merchant_id, "Merchant verified");
        Ok(merchant)
    }

    /// Fail a merchant's review
    pub fn reject(&self, merchant_id: Uuid) -> Result<Merchant> {
        self.storage.update_merchant(merchant_id, |m| {
            if m.compliance_status != ComplianceStatus::PendingReview {
                return Err(Error::Other(format!(
                    "Cannot reject merchant in {:?}",
                    m.compliance_status
                )));
            }
            m.compliance_status = ComplianceStatus::Rejected;
            Ok(())
        })
    }

    /// Suspend a merchant; blocks issuance from this call on
    pub fn suspend(&self, merchant_id: Uuid) -> Result<Merchant> {
        let merchant = self.storage.update_merchant(merchant_id, |m| {
            m.compliance_status = ComplianceStatus::Suspended;
            Ok(())
        })?;
        tracing::warn!(merchant_id = %merchant_id, "Merchant suspended");
        Ok(merchant)
    }

    /// Lift a suspension
    pub fn reinstate(&self, merchant_id: Uuid) -> Result<Merchant> {
        let merchant = self.storage.update_merchant(merchant_id, |m| {
            if m.compliance_status != ComplianceStatus::Suspended {
                return Err(Error::Other(format!(
                    "Cannot reinstate merchant in {:?}",
                    m.compliance_status
                )));
            }
            m.compliance_status = ComplianceStatus::Verified;
            Ok(())
        })?;
        tracing::info!(merchant_id = %merchant_id, "Merchant reinstated");
        Ok(merchant)
    }

    /// Change the discount rate applied to future bills
    pub fn set_discount_rate(&self, merchant_id: Uuid, rate: DiscountRate) -> Result<Merchant> {
        self.storage.update_merchant(merchant_id, |m| {
            m.discount_rate = rate;
            Ok(())
        })
    }

    /// Change the configured settlement mode for future settlements
    pub fn set_settlement_mode(&self, merchant_id: Uuid, mode: SettlementMode) -> Result<Merchant> {
        self.storage.update_merchant(merchant_id, |m| {
            m.settlement_mode = mode;
            Ok(())
        })
    }

    /// Set the payout destination required for direct payouts
    pub fn set_payout_account(&self, merchant_id: Uuid, account: &str) -> Result<Merchant> {
        self.storage.update_merchant(merchant_id, |m| {
            m.payout_account = Some(account.to_string());
            Ok(())
        })
    }

    /// Pull a merchant off the direct payout route.
    ///
    /// Called when the processor reports a split failure; settlement
    /// falls back to platform-managed until restored.
    pub fn revoke_direct_payout(&self, merchant_id: Uuid, reason: &str) -> Result<Merchant> {
        let merchant = self.storage.update_merchant(merchant_id, |m| {
            m.direct_payout_ok = false;
            Ok(())
        })?;
        tracing::warn!(
            merchant_id = %merchant_id,
            reason = %reason,
            "Direct payout revoked"
        );
        Ok(merchant)
    }

    /// Re-enable direct payouts after the underlying issue is fixed
    pub fn restore_direct_payout(&self, merchant_id: Uuid) -> Result<Merchant> {
        let merchant = self.storage.update_merchant(merchant_id, |m| {
            m.direct_payout_ok = true;
            Ok(())
        })?;
        tracing::info!(merchant_id = %merchant_id, "Direct payout restored");
        Ok(merchant)
    }
}
