//! Expiry sweeper.
//!
//! Bills past their expiry are already rejected on every hot path; the
//! sweeper is the janitor that flips stale Active and Locked bills to
//! Expired so the store reflects reality even for bills nobody ever
//! scanned again.

use crate::config::PaymentsConfig;
use crate::error::Result;
use billing_core::metrics::BILLS_EXPIRED_TOTAL;
use billing_core::Storage;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Ladder entries examined per pass
const SWEEP_BATCH: usize = 512;

/// Outcome of one sweep pass
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepReport {
    /// Ladder entries due at the pass cutoff
    pub scanned: usize,
    /// Bills flipped to Expired
    pub expired: usize,
}

/// Background task that expires overdue bills
pub struct ExpirySweeper {
    storage: Arc<Storage>,
    interval: Duration,
}

impl ExpirySweeper {
    /// Create a sweeper over the shared store
    pub fn new(storage: Arc<Storage>, config: &PaymentsConfig) -> Self {
        Self {
            storage,
            interval: Duration::from_secs(config.sweep_interval_secs),
        }
    }

    /// Run forever on the configured interval
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            match self.sweep_once(Utc::now()) {
                Ok(report) if report.scanned > 0 => {
                    info!(
                        scanned = report.scanned,
                        expired = report.expired,
                        "Expiry sweep finished"
                    );
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Expiry sweep failed"),
            }
        }
    }

    /// One pass over the expiry ladder.
    ///
    /// Bills that reached a terminal state since their ladder entry was
    /// written are skipped and their leftover entries cleaned up.
    pub fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let due = self.storage.stale_bill_ids(now, SWEEP_BATCH)?;
        let mut report = SweepReport {
            scanned: due.len(),
            expired: 0,
        };

        for bill_id in due {
            match self.storage.expire_bill(bill_id, now) {
                Ok(Some(_)) => {
                    BILLS_EXPIRED_TOTAL.inc();
                    report.expired += 1;
                }
                Ok(None) => {
                    let bill = self.storage.get_bill(bill_id)?;
                    self.storage.clear_expiry_entry(&bill)?;
                }
                Err(e) => warn!(bill_id = %bill_id, error = %e, "Could not expire bill"),
            }
        }
        Ok(report)
    }
}
