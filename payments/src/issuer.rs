//! Bill issuance for merchant terminals.
//!
//! A merchant asks for a bill at the gross register price; the
//! platform computes the discount server-side at the merchant's
//! configured rate and returns an opaque token for the QR code.
//! Terminals never compute or submit discounted amounts themselves.

use crate::config::PaymentsConfig;
use crate::error::Result;
use billing_core::metrics::BILLS_ISSUED_TOTAL;
use billing_core::{discount, token, Amount, Bill, BillStatus, DiscountRate, Storage};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Everything the terminal needs to render a QR bill
#[derive(Debug, Clone)]
pub struct IssuedBill {
    /// Newly assigned bill ID
    pub bill_id: Uuid,
    /// Opaque token to embed in the QR code
    pub token: String,
    /// Register price before discount
    pub gross_amount: Amount,
    /// Rate frozen onto the bill
    pub discount_rate: DiscountRate,
    /// Server-computed discount
    pub discount_amount: Amount,
    /// What the payer will be charged
    pub net_payable: Amount,
    /// When the bill stops being payable
    pub expires_at: DateTime<Utc>,
}

/// Issues and withdraws bills on behalf of merchants
pub struct BillIssuer {
    storage: Arc<Storage>,
    bill_ttl: Duration,
}

impl BillIssuer {
    /// Create an issuer over the shared store
    pub fn new(storage: Arc<Storage>, config: &PaymentsConfig) -> Self {
        Self {
            storage,
            bill_ttl: Duration::seconds(config.bill_ttl_secs as i64),
        }
    }

    /// Issue a bill at the merchant's configured discount rate.
    ///
    /// The discount split is computed here and frozen onto the bill;
    /// eligibility is enforced inside the insert transaction so a
    /// concurrent suspension cannot slip a bill through.
    pub fn issue_bill(&self, merchant_id: Uuid, gross: Amount) -> Result<IssuedBill> {
        let merchant = self.storage.get_merchant(merchant_id)?;
        let split = discount::breakdown(gross, merchant.discount_rate)?;

        let now = Utc::now();
        let bill = Bill {
            bill_id: Uuid::now_v7(),
            merchant_id,
            gross_amount: gross,
            discount_rate: merchant.discount_rate,
            discount_amount: split.discount,
            net_payable: split.net_payable,
            status: BillStatus::Active,
            created_at: now,
            expires_at: now + self.bill_ttl,
            locked_at: None,
            locked_by: None,
            processor_reference: None,
            paid_at: None,
            failure_count: 0,
        };
        self.storage.insert_bill(&bill)?;
        let token = token::encode_token(&bill)?;

        BILLS_ISSUED_TOTAL.inc();
        info!(
            bill_id = %bill.bill_id,
            merchant_id = %merchant_id,
            gross = %gross,
            net = %bill.net_payable,
            rate = merchant.discount_rate.percent(),
            "Bill issued"
        );

        Ok(IssuedBill {
            bill_id: bill.bill_id,
            token,
            gross_amount: bill.gross_amount,
            discount_rate: bill.discount_rate,
            discount_amount: bill.discount_amount,
            net_payable: bill.net_payable,
            expires_at: bill.expires_at,
        })
    }

    /// Withdraw an Active bill before anyone scans it.
    ///
    /// Bills belonging to other merchants are reported as missing, not
    /// as forbidden, so merchant identifiers cannot be probed.
    pub fn cancel_bill(&self, merchant_id: Uuid, bill_id: Uuid) -> Result<Bill> {
        let bill = self.storage.get_bill(bill_id)?;
        if bill.merchant_id != merchant_id {
            return Err(billing_core::Error::BillNotFound(bill_id).into());
        }
        let cancelled = self.storage.cancel_bill(bill_id, Utc::now())?;
        info!(bill_id = %bill_id, merchant_id = %merchant_id, "Bill cancelled");
        Ok(cancelled)
    }
}
