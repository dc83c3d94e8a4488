//! Token redemption: the payer's scan.
//!
//! Decodes the QR token, cross-checks it against the stored bill, and
//! locks the bill to the scanning payer. The store is authoritative
//! for every decision; the token only carries enough to find the bill
//! and fail fast on garbage.

use crate::error::Result;
use billing_core::metrics::REDEMPTIONS_TOTAL;
use billing_core::{token, Amount, DiscountRate, Error as CoreError, PayerId, Storage};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// What the payer's app shows after a successful scan
#[derive(Debug, Clone)]
pub struct RedeemedBill {
    /// Bill now locked to the scanning payer
    pub bill_id: Uuid,
    /// Merchant name to display
    pub merchant_name: String,
    /// Price before discount
    pub gross_amount: Amount,
    /// Discount granted
    pub discount_amount: Amount,
    /// What the payer will be charged
    pub net_payable: Amount,
    /// Rate behind the discount
    pub discount_rate: DiscountRate,
    /// When the lock and the bill lapse
    pub expires_at: DateTime<Utc>,
}

/// Redeems scanned tokens and locks bills to payers
pub struct BillRedeemer {
    storage: Arc<Storage>,
}

impl BillRedeemer {
    /// Create a redeemer over the shared store
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Decode a scanned token and lock its bill to the payer.
    ///
    /// Exactly one concurrent scanner wins the lock; the rest see
    /// `BillNotActive`. A token naming a missing bill or the wrong
    /// merchant is malformed, the same as a token that fails its
    /// integrity check.
    pub fn redeem_token(&self, token: &str, payer: &PayerId) -> Result<RedeemedBill> {
        let payload = match token::decode_token(token) {
            Ok(payload) => payload,
            Err(e) => {
                REDEMPTIONS_TOTAL.with_label_values(&["malformed"]).inc();
                return Err(e.into());
            }
        };

        let bill = match self.storage.get_bill(payload.bill_id) {
            Ok(bill) => bill,
            Err(CoreError::BillNotFound(_)) => {
                REDEMPTIONS_TOTAL.with_label_values(&["malformed"]).inc();
                return Err(CoreError::MalformedToken("unknown bill".to_string()).into());
            }
            Err(e) => return Err(e.into()),
        };
        if bill.merchant_id != payload.merchant_id {
            REDEMPTIONS_TOTAL.with_label_values(&["malformed"]).inc();
            return Err(CoreError::MalformedToken("merchant mismatch".to_string()).into());
        }

        let locked = match self.storage.lock_bill(payload.bill_id, payer, Utc::now()) {
            Ok(locked) => locked,
            Err(e) => {
                let outcome = match &e {
                    CoreError::BillExpired(_) => "expired",
                    CoreError::BillNotActive { .. } => "not_active",
                    _ => "error",
                };
                REDEMPTIONS_TOTAL.with_label_values(&[outcome]).inc();
                return Err(e.into());
            }
        };
        let merchant = self.storage.get_merchant(locked.merchant_id)?;

        REDEMPTIONS_TOTAL.with_label_values(&["ok"]).inc();
        info!(
            bill_id = %locked.bill_id,
            payer = payer.as_str(),
            net = %locked.net_payable,
            "Bill locked to payer"
        );

        Ok(RedeemedBill {
            bill_id: locked.bill_id,
            merchant_name: merchant.display_name,
            gross_amount: locked.gross_amount,
            discount_amount: locked.discount_amount,
            net_payable: locked.net_payable,
            discount_rate: locked.discount_rate,
            expires_at: locked.expires_at,
        })
    }
}
