//! Error types for the billing core

use thiserror::Error;
use uuid::Uuid;

use crate::types::{Amount, BillStatus, ComplianceStatus};

/// Result type for billing operations
pub type Result<T> = std::result::Result<T, Error>;

/// Billing errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Bill amount must be a positive number of minor units
    #[error("Invalid amount: {0} minor units")]
    InvalidAmount(i64),

    /// Discount rate outside the platform's allowed set
    #[error("Invalid discount rate: {0}%")]
    InvalidRate(u8),

    /// Merchant may not issue bills in its current compliance state
    #[error("Merchant {merchant_id} not eligible ({status:?})")]
    MerchantNotEligible {
        /// Merchant that failed the gate
        merchant_id: Uuid,
        /// Compliance status at the time of the check
        status: ComplianceStatus,
    },

    /// Merchant not found
    #[error("Merchant not found: {0}")]
    MerchantNotFound(Uuid),

    /// Token failed decoding or its integrity check
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// Bill expired
    #[error("Bill expired: {0}")]
    BillExpired(Uuid),

    /// Bill is not in the state the operation requires
    #[error("Bill {bill_id} not active ({status:?})")]
    BillNotActive {
        /// Bill that refused the transition
        bill_id: Uuid,
        /// Its current status
        status: BillStatus,
    },

    /// Bill not found
    #[error("Bill not found: {0}")]
    BillNotFound(Uuid),

    /// Confirmation signature did not verify
    #[error("Invalid confirmation signature")]
    InvalidSignature,

    /// Confirmed amount differs from the bill's payable amount
    #[error("Amount mismatch: expected {expected}, got {actual}")]
    AmountMismatch {
        /// Payable amount on the bill
        expected: Amount,
        /// Amount the confirmation reported
        actual: Amount,
    },

    /// Confirmation reference does not map to any bill
    #[error("Unknown processor reference: {0}")]
    UnknownReference(String),

    /// Order already belongs to a settlement
    #[error("Order already settled: {0}")]
    AlreadySettled(Uuid),

    /// Settlement already marked paid
    #[error("Settlement already paid: {0}")]
    AlreadyPaid(Uuid),

    /// Settlement not found
    #[error("Unknown settlement: {0}")]
    UnknownSettlement(Uuid),

    /// Order not found
    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
