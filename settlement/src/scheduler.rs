//! Settlement scheduler.
//!
//! Interval loop that settles the trailing period for every known
//! merchant. Passes are cheap to overlap: only settlement-pending
//! orders are ever selected, so re-running a period cannot double-pay.

use crate::config::ScheduleConfig;
use crate::engine::SettlementEngine;
use crate::error::{Error, Result};
use crate::types::SchedulerReport;
use billing_core::Storage;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Periodically settles the trailing period for every merchant
pub struct SettlementScheduler {
    engine: Arc<SettlementEngine>,
    storage: Arc<Storage>,
    config: ScheduleConfig,
    last_pass: Mutex<Option<DateTime<Utc>>>,
}

impl SettlementScheduler {
    /// Create a scheduler over the shared engine and store
    pub fn new(
        engine: Arc<SettlementEngine>,
        storage: Arc<Storage>,
        config: ScheduleConfig,
    ) -> Self {
        Self {
            engine,
            storage,
            config,
            last_pass: Mutex::new(None),
        }
    }

    /// Run passes on the configured interval until the task is dropped
    pub async fn run(self: Arc<Self>) {
        if !self.config.enabled {
            info!("Settlement scheduler disabled");
            return;
        }
        info!(
            interval_hours = self.config.interval_hours,
            lookback_hours = self.config.lookback_hours,
            "Settlement scheduler started"
        );

        let mut ticker = tokio::time::interval(self.config.interval());
        loop {
            ticker.tick().await;
            match self.run_once(Utc::now()).await {
                Ok(report) => info!(
                    merchants = report.merchants,
                    settled = report.settled,
                    empty = report.empty,
                    failed = report.failed,
                    "Settlement pass finished"
                ),
                Err(e) => warn!(error = %e, "Settlement pass failed"),
            }
        }
    }

    /// One pass over every known merchant.
    ///
    /// Individual merchant failures are logged and counted; they never
    /// abort the pass for everyone else.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SchedulerReport> {
        let period_start = now - self.config.lookback();
        let mut report = SchedulerReport::default();

        for merchant_id in self.storage.merchant_ids()? {
            report.merchants += 1;
            match self.settle_merchant(merchant_id, period_start, now).await {
                Ok(()) => report.settled += 1,
                Err(Error::NothingToSettle { .. }) => {
                    report.empty += 1;
                    debug!(merchant_id = %merchant_id, "Nothing to settle");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(merchant_id = %merchant_id, error = %e, "Merchant settlement failed");
                }
            }
        }

        *self.last_pass.lock() = Some(now);
        Ok(report)
    }

    async fn settle_merchant(
        &self,
        merchant_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<()> {
        let summary = self
            .engine
            .compute_settlement(merchant_id, period_start, period_end)
            .await?;
        debug!(
            merchant_id = %merchant_id,
            settlement_id = %summary.settlement_id,
            total = %summary.payable_total,
            "Merchant settled"
        );
        Ok(())
    }

    /// When the last pass completed
    pub fn last_pass(&self) -> Option<DateTime<Utc>> {
        *self.last_pass.lock()
    }
}
