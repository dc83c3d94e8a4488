//! Error types for the payments pipeline

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by issuance, redemption, and confirmation handling
#[derive(Error, Debug)]
pub enum Error {
    /// Error from the billing core
    #[error(transparent)]
    Core(#[from] billing_core::Error),

    /// The payment processor rejected or lost an operation
    #[error("Processor error: {0}")]
    Processor(String),

    /// The caller is not the payer holding the lock
    #[error("Bill {bill_id} is locked by another payer")]
    SessionMismatch {
        /// Bill whose lock belongs to someone else
        bill_id: Uuid,
    },

    /// The confirmation inbox has shut down
    #[error("Confirmation channel closed")]
    ChannelClosed,
}

impl Error {
    /// Whether retrying the same operation can ever succeed.
    ///
    /// Permanent rejections are logged and dropped by the confirmation
    /// worker; everything else is retried with backoff.
    pub fn is_permanent(&self) -> bool {
        match self {
            Error::Core(core) => matches!(
                core,
                billing_core::Error::InvalidSignature
                    | billing_core::Error::MalformedToken(_)
                    | billing_core::Error::UnknownReference(_)
                    | billing_core::Error::AmountMismatch { .. }
                    | billing_core::Error::BillNotActive { .. }
                    | billing_core::Error::BillNotFound(_)
                    | billing_core::Error::BillExpired(_)
            ),
            Error::SessionMismatch { .. } => true,
            Error::Processor(_) => false,
            Error::ChannelClosed => true,
        }
    }
}

/// Result type for payment operations
pub type Result<T> = std::result::Result<T, Error>;
