//! Payment processor boundary.
//!
//! The platform never touches card rails directly. It opens hosted
//! checkout orders at an external processor and later receives signed
//! confirmations for them through the inbox.

use crate::confirmation::{PaymentConfirmation, PaymentOutcome, SignedConfirmation};
use crate::error::Result;
use async_trait::async_trait;
use billing_core::crypto::KeyPair;
use billing_core::Amount;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Request to open a hosted checkout order for the discounted amount
#[derive(Debug, Clone)]
pub struct OpenOrderRequest {
    /// Bill being paid
    pub bill_id: Uuid,
    /// Merchant receiving the funds
    pub merchant_id: Uuid,
    /// Exactly the bill's net payable
    pub amount: Amount,
    /// Line shown to the payer at checkout
    pub description: String,
}

/// An order the processor is ready to collect against
#[derive(Debug, Clone)]
pub struct ProcessorOrder {
    /// Processor-assigned reference, unique per order
    pub reference: String,

    /// Opaque parameters the payer's device feeds to the checkout SDK
    pub checkout_params: serde_json::Value,
}

/// Boundary to the hosted-checkout payment processor
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Open an order to collect exactly `request.amount`
    async fn open_order(&self, request: OpenOrderRequest) -> Result<ProcessorOrder>;

    /// Fetch a previously opened order by its reference
    async fn fetch_order(&self, reference: &str) -> Result<Option<ProcessorOrder>>;
}

/// In-memory processor for tests and demos.
///
/// Assigns sequential references, remembers every opened order, and
/// signs confirmations with its own keypair the way the real processor
/// signs webhook deliveries.
pub struct RecordingProcessor {
    orders: DashMap<String, ProcessorOrder>,
    counter: AtomicU64,
    keypair: KeyPair,
}

impl RecordingProcessor {
    /// Create a processor with a fresh signing keypair
    pub fn new() -> Self {
        Self {
            orders: DashMap::new(),
            counter: AtomicU64::new(0),
            keypair: KeyPair::generate(),
        }
    }

    /// Verification key the platform should be configured with
    pub fn public_key(&self) -> [u8; 32] {
        self.keypair.public_key()
    }

    /// How many orders have been opened
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Produce a signed success confirmation for an opened order
    pub fn confirm_success(
        &self,
        reference: &str,
        amount: Amount,
        split_failed: bool,
    ) -> Result<SignedConfirmation> {
        SignedConfirmation::sign(
            PaymentConfirmation {
                processor_reference: reference.to_string(),
                outcome: PaymentOutcome::Succeeded { split_failed },
                amount,
                confirmed_at: Utc::now(),
            },
            &self.keypair,
        )
    }

    /// Produce a signed failure confirmation for an opened order
    pub fn confirm_failure(
        &self,
        reference: &str,
        amount: Amount,
        reason: &str,
    ) -> Result<SignedConfirmation> {
        SignedConfirmation::sign(
            PaymentConfirmation {
                processor_reference: reference.to_string(),
                outcome: PaymentOutcome::Failed {
                    reason: reason.to_string(),
                },
                amount,
                confirmed_at: Utc::now(),
            },
            &self.keypair,
        )
    }
}

impl Default for RecordingProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentProcessor for RecordingProcessor {
    async fn open_order(&self, request: OpenOrderRequest) -> Result<ProcessorOrder> {
        let sequence = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let reference = format!("po_{:08}", sequence);
        let order = ProcessorOrder {
            reference: reference.clone(),
            checkout_params: json!({
                "reference": reference,
                "amount": request.amount.minor(),
                "description": request.description,
                "merchant_id": request.merchant_id,
            }),
        };
        self.orders.insert(reference, order.clone());
        Ok(order)
    }

    async fn fetch_order(&self, reference: &str) -> Result<Option<ProcessorOrder>> {
        Ok(self.orders.get(reference).map(|entry| entry.value().clone()))
    }
}
