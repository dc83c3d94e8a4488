//! Payment orchestration: hosted checkout and confirmation handling.
//!
//! Initiation opens a processor order for a bill the payer holds the
//! lock on. Confirmation applies the processor's signed verdict with
//! exactly-once effect, keyed by processor reference. Redelivered
//! confirmations acknowledge as duplicates without touching state.

use crate::config::PaymentsConfig;
use crate::confirmation::{PaymentConfirmation, PaymentOutcome, SignedConfirmation};
use crate::error::{Error, Result};
use crate::processor::{OpenOrderRequest, PaymentProcessor};
use billing_core::metrics::{CONFIRMATIONS_TOTAL, CONFIRMATION_APPLY_SECONDS};
use billing_core::{
    discount, Amount, Bill, BillEvent, BillEventKind, BillStatus, Error as CoreError,
    MerchantDirectory, Order, PayerId, RecordOutcome, SettlementMode, Storage,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// What the payer's device needs to start hosted checkout
#[derive(Debug, Clone)]
pub struct CheckoutIntent {
    /// Bill being paid
    pub bill_id: Uuid,
    /// Order reference at the processor
    pub processor_reference: String,
    /// Opaque parameters for the checkout SDK
    pub checkout_params: serde_json::Value,
    /// Amount the processor will collect
    pub net_payable: Amount,
}

/// Acknowledgement for one delivered confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationAck {
    /// A new order was written
    Recorded(Uuid),
    /// Redelivery of an outcome already applied
    Duplicate,
    /// Failure processed; the bill is payable again
    Released,
}

/// Drives bills from Locked to Paid against the processor
pub struct PaymentOrchestrator {
    storage: Arc<Storage>,
    merchants: MerchantDirectory,
    processor: Arc<dyn PaymentProcessor>,
    platform_fee_bps: u32,
    processor_public_key: [u8; 32],
}

impl PaymentOrchestrator {
    /// Requires a configured processor verification key
    pub fn new(
        storage: Arc<Storage>,
        processor: Arc<dyn PaymentProcessor>,
        config: &PaymentsConfig,
    ) -> Result<Self> {
        let processor_public_key = config.processor_key()?;
        Ok(Self {
            merchants: MerchantDirectory::new(storage.clone()),
            storage,
            processor,
            platform_fee_bps: config.platform_fee_bps,
            processor_public_key,
        })
    }

    /// Open hosted checkout for a bill the payer holds the lock on.
    ///
    /// Re-initiating while the bill is still locked returns the order
    /// already attached instead of opening a second one, so a payer
    /// whose app restarted mid-checkout rejoins the same order.
    pub async fn initiate_payment(&self, bill_id: Uuid, payer: &PayerId) -> Result<CheckoutIntent> {
        let now = Utc::now();
        let bill = self.storage.get_bill(bill_id)?;

        match bill.status {
            BillStatus::Locked if bill.is_expired_at(now) => {
                self.storage.expire_bill(bill_id, now)?;
                return Err(CoreError::BillExpired(bill_id).into());
            }
            BillStatus::Locked => {}
            BillStatus::Expired => return Err(CoreError::BillExpired(bill_id).into()),
            status => return Err(CoreError::BillNotActive { bill_id, status }.into()),
        }
        if bill.locked_by.as_ref() != Some(payer) {
            return Err(Error::SessionMismatch { bill_id });
        }

        if let Some(reference) = bill.processor_reference.clone() {
            let existing = self
                .processor
                .fetch_order(&reference)
                .await?
                .ok_or_else(|| Error::Processor(format!("Order {} lost at processor", reference)))?;
            return Ok(CheckoutIntent {
                bill_id,
                processor_reference: reference,
                checkout_params: existing.checkout_params,
                net_payable: bill.net_payable,
            });
        }

        let merchant = self.storage.get_merchant(bill.merchant_id)?;
        let opened = self
            .processor
            .open_order(OpenOrderRequest {
                bill_id,
                merchant_id: bill.merchant_id,
                amount: bill.net_payable,
                description: format!("Payment to {}", merchant.display_name),
            })
            .await?;
        self.storage
            .attach_processor_reference(bill_id, &opened.reference, now)?;

        info!(
            bill_id = %bill_id,
            reference = %opened.reference,
            net = %bill.net_payable,
            "Checkout opened"
        );
        Ok(CheckoutIntent {
            bill_id,
            processor_reference: opened.reference,
            checkout_params: opened.checkout_params,
            net_payable: bill.net_payable,
        })
    }

    /// Apply one at-least-once confirmation with exactly-once effect
    pub fn confirm_payment(&self, signed: &SignedConfirmation) -> Result<ConfirmationAck> {
        let timer = CONFIRMATION_APPLY_SECONDS.start_timer();
        let result = self.apply_confirmation(signed);
        timer.observe_duration();

        let outcome = match &result {
            Ok(ConfirmationAck::Recorded(_)) => "recorded",
            Ok(ConfirmationAck::Duplicate) => "duplicate",
            Ok(ConfirmationAck::Released) => "released",
            Err(_) => "rejected",
        };
        CONFIRMATIONS_TOTAL.with_label_values(&[outcome]).inc();
        result
    }

    fn apply_confirmation(&self, signed: &SignedConfirmation) -> Result<ConfirmationAck> {
        let now = Utc::now();

        if let Err(e) = signed.verify(&self.processor_public_key) {
            warn!(
                reference = %signed.confirmation.processor_reference,
                "Confirmation signature rejected"
            );
            return Err(e);
        }
        let confirmation = &signed.confirmation;

        let bill = match self
            .storage
            .find_bill_by_processor_reference(&confirmation.processor_reference)
        {
            Ok(bill) => bill,
            Err(CoreError::UnknownReference(reference)) => {
                warn!(reference = %reference, "Confirmation for unknown reference");
                return Err(CoreError::UnknownReference(reference).into());
            }
            Err(e) => return Err(e.into()),
        };

        match &confirmation.outcome {
            PaymentOutcome::Failed { reason } => self.apply_failure(&bill, confirmation, reason, now),
            PaymentOutcome::Succeeded { split_failed } => {
                self.apply_success(&bill, confirmation, *split_failed, now)
            }
        }
    }

    /// A failed charge releases the lock so the bill is payable again
    /// until its original expiry.
    fn apply_failure(
        &self,
        bill: &Bill,
        confirmation: &PaymentConfirmation,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<ConfirmationAck> {
        match bill.status {
            // Only the checkout this confirmation belongs to may be released;
            // a re-locked bill holds a newer reference
            BillStatus::Locked
                if bill.processor_reference.as_deref()
                    == Some(confirmation.processor_reference.as_str()) =>
            {
                self.storage.release_bill(bill.bill_id, reason, now)?;
                info!(
                    bill_id = %bill.bill_id,
                    reason = reason,
                    "Payment failed; bill released for retry"
                );
                Ok(ConfirmationAck::Released)
            }
            BillStatus::Locked | BillStatus::Active => Ok(ConfirmationAck::Duplicate),
            status => {
                warn!(
                    bill_id = %bill.bill_id,
                    status = ?status,
                    "Failure confirmation for finished bill ignored"
                );
                Ok(ConfirmationAck::Duplicate)
            }
        }
    }

    fn apply_success(
        &self,
        bill: &Bill,
        confirmation: &PaymentConfirmation,
        split_failed: bool,
        now: DateTime<Utc>,
    ) -> Result<ConfirmationAck> {
        // Late confirmations never create orders, only an audit event
        if !matches!(bill.status, BillStatus::Locked | BillStatus::Paid) {
            self.storage.append_bill_event(&BillEvent::record(
                bill.bill_id,
                BillEventKind::LateConfirmation,
                now,
                Some(confirmation.processor_reference.clone()),
            ))?;
            warn!(
                bill_id = %bill.bill_id,
                status = ?bill.status,
                reference = %confirmation.processor_reference,
                "Late confirmation; no order recorded"
            );
            return Err(CoreError::BillNotActive {
                bill_id: bill.bill_id,
                status: bill.status,
            }
            .into());
        }

        if confirmation.amount != bill.net_payable {
            warn!(
                bill_id = %bill.bill_id,
                expected = %bill.net_payable,
                actual = %confirmation.amount,
                "Confirmation amount mismatch"
            );
            return Err(CoreError::AmountMismatch {
                expected: bill.net_payable,
                actual: confirmation.amount,
            }
            .into());
        }

        let Some(payer) = bill.locked_by.clone() else {
            return Err(
                CoreError::Other(format!("Bill {} has no payer attached", bill.bill_id)).into(),
            );
        };
        let mode = self.effective_mode(bill.merchant_id, split_failed)?;

        let order = Order {
            order_id: Uuid::now_v7(),
            bill_id: bill.bill_id,
            merchant_id: bill.merchant_id,
            payer,
            gross_amount: bill.gross_amount,
            discount_amount: bill.discount_amount,
            platform_fee: discount::platform_fee(confirmation.amount, self.platform_fee_bps),
            net_paid: confirmation.amount,
            processor_reference: confirmation.processor_reference.clone(),
            settlement_mode: mode,
            settlement_id: None,
            paid_at: confirmation.confirmed_at,
        };
        match self.storage.record_payment(&order)? {
            RecordOutcome::Recorded => {
                info!(
                    bill_id = %bill.bill_id,
                    order_id = %order.order_id,
                    net_paid = %order.net_paid,
                    fee = %order.platform_fee,
                    "Payment recorded"
                );
                Ok(ConfirmationAck::Recorded(order.order_id))
            }
            RecordOutcome::Duplicate => Ok(ConfirmationAck::Duplicate),
        }
    }

    /// Settlement mode snapshotted onto the order at confirmation time.
    /// A failed split revokes direct payout before the snapshot, so
    /// this order and everything after it settles platform-managed.
    fn effective_mode(&self, merchant_id: Uuid, split_failed: bool) -> Result<SettlementMode> {
        if split_failed {
            self.merchants
                .revoke_direct_payout(merchant_id, "processor split failed")?;
            return Ok(SettlementMode::PlatformManaged);
        }
        let merchant = self.storage.get_merchant(merchant_id)?;
        Ok(if merchant.direct_payout_eligible() {
            SettlementMode::Direct
        } else {
            SettlementMode::PlatformManaged
        })
    }
}
