//! Scanpay Billing Core
//!
//! Bill lifecycle, server-side discount math, opaque QR tokens, and the
//! transactional store underneath the merchant payment platform.
//!
//! # Architecture
//!
//! - **Server-authoritative money**: amounts and discounts are computed
//!   and stored here; tokens and payers never carry them
//! - **CAS transitions**: every lifecycle change is a pessimistic
//!   RocksDB transaction over the governing row
//! - **Exactly-once orders**: confirmations are idempotent on the
//!   processor reference
//! - **Audit trail**: every transition appends an event in the same
//!   transaction

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod types;
pub mod storage;
pub mod discount;
pub mod token;
pub mod crypto;
pub mod merchants;
pub mod error;
pub mod config;
pub mod metrics;

// Re-exports
pub use config::StoreConfig;
pub use error::{Error, Result};
pub use merchants::MerchantDirectory;
pub use storage::{RecordOutcome, Storage, StorageStats};
pub use token::TokenPayload;
pub use types::{
    Amount, Bill, BillEvent, BillEventKind, BillStatus, ComplianceStatus, DiscountRate, Merchant,
    Order, PayerId, Settlement, SettlementMode, SettlementStatus, Signature,
};
