//! Scanpay Settlement
//!
//! Rolls paid orders into per-merchant settlement statements and pays
//! them out on a schedule.
//!
//! # Architecture
//!
//! 1. **Selection**: every settlement-pending order paid before the
//!    period end; an order joins exactly one settlement
//! 2. **Payout method**: Direct only while the merchant is eligible at
//!    computation time, otherwise platform-managed with the fallback
//!    flagged on the statement
//! 3. **Payout**: Pending -> Paid exactly once per statement
//!
//! # Example
//!
//! ```no_run
//! use billing_core::{StoreConfig, Storage};
//! use settlement::{ScheduleConfig, SettlementEngine, SettlementScheduler};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> settlement::Result<()> {
//!     let storage = Arc::new(Storage::open(&StoreConfig::default())?);
//!     let engine = Arc::new(SettlementEngine::new(storage.clone()));
//!     let scheduler = Arc::new(SettlementScheduler::new(
//!         engine,
//!         storage,
//!         ScheduleConfig::daily(),
//!     ));
//!     scheduler.run().await;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod config;
pub mod engine;
pub mod error;
pub mod scheduler;
pub mod types;

// Re-exports
pub use config::ScheduleConfig;
pub use engine::SettlementEngine;
pub use error::{Error, Result};
pub use scheduler::SettlementScheduler;
pub use types::{SchedulerReport, SettlementSummary};
