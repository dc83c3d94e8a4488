//! Error types for settlement

use thiserror::Error;
use uuid::Uuid;

/// Result type for settlement operations
pub type Result<T> = std::result::Result<T, Error>;

/// Settlement errors
#[derive(Error, Debug)]
pub enum Error {
    /// Error from the billing core
    #[error(transparent)]
    Core(#[from] billing_core::Error),

    /// No settlement-pending orders in the period
    #[error("Nothing to settle for merchant {merchant_id}")]
    NothingToSettle {
        /// Merchant whose period came up empty
        merchant_id: Uuid,
    },

    /// Period end does not follow period start
    #[error("Settlement period end must be after its start")]
    InvalidPeriod,
}
