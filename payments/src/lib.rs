//! Scanpay Payments
//!
//! The payment pipeline over the billing core:
//! - Issuance: merchant gross price in, QR token out
//! - Redemption: payer scan locks the bill
//! - Orchestration: hosted checkout at the processor, signed
//!   confirmations applied exactly once
//! - Ingest: at-least-once confirmation inbox with retry
//! - Sweep: background expiry of stale bills

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod confirmation;
pub mod error;
pub mod ingest;
pub mod issuer;
pub mod orchestrator;
pub mod processor;
pub mod redeemer;
pub mod sweep;

pub use config::PaymentsConfig;
pub use confirmation::{PaymentConfirmation, PaymentOutcome, SignedConfirmation};
pub use error::{Error, Result};
pub use ingest::{spawn_confirmation_worker, ConfirmationInbox};
pub use issuer::{BillIssuer, IssuedBill};
pub use orchestrator::{CheckoutIntent, ConfirmationAck, PaymentOrchestrator};
pub use processor::{OpenOrderRequest, PaymentProcessor, ProcessorOrder, RecordingProcessor};
pub use redeemer::{BillRedeemer, RedeemedBill};
pub use sweep::{ExpirySweeper, SweepReport};
