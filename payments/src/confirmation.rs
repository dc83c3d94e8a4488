//! Signed payment confirmations delivered by the processor.
//!
//! The processor reports outcomes at least once; deduplication happens
//! downstream against the stored order, keyed by processor reference.
//! Every confirmation carries a detached Ed25519 signature over its
//! canonical encoding so forged or corrupted deliveries never reach
//! the ledger.

use billing_core::crypto::KeyPair;
use billing_core::{Amount, Signature};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome the processor reports for one checkout order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentOutcome {
    /// The payer was charged
    Succeeded {
        /// The onward split to the merchant failed and needs follow-up
        split_failed: bool,
    },
    /// The charge did not complete
    Failed {
        /// Processor-reported reason
        reason: String,
    },
}

/// One payment confirmation, identified by processor reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    /// Reference of the checkout order this confirms
    pub processor_reference: String,

    /// What happened at the processor
    pub outcome: PaymentOutcome,

    /// Amount charged, in minor units
    pub amount: Amount,

    /// When the processor finalized the charge
    pub confirmed_at: DateTime<Utc>,
}

impl PaymentConfirmation {
    /// Deterministic byte encoding the signature covers
    pub fn canonical_bytes(&self) -> crate::Result<Vec<u8>> {
        let bytes = bincode::serialize(self).map_err(billing_core::Error::from)?;
        Ok(bytes)
    }
}

/// A confirmation plus the processor's detached signature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedConfirmation {
    /// The confirmation body the signature covers
    pub confirmation: PaymentConfirmation,
    /// Ed25519 signature over the canonical bytes
    pub signature: Signature,
}

impl SignedConfirmation {
    /// Sign a confirmation with the processor keypair
    pub fn sign(confirmation: PaymentConfirmation, keypair: &KeyPair) -> crate::Result<Self> {
        let bytes = confirmation.canonical_bytes()?;
        let signature = keypair.sign(&bytes);
        Ok(Self {
            confirmation,
            signature,
        })
    }

    /// Verify the signature against the platform's configured processor key
    pub fn verify(&self, public_key: &[u8; 32]) -> crate::Result<()> {
        let bytes = self.confirmation.canonical_bytes()?;
        if self.signature.verify(&bytes, public_key) {
            Ok(())
        } else {
            Err(billing_core::Error::InvalidSignature.into())
        }
    }
}
