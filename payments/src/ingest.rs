//! Confirmation inbox: the at-least-once delivery seam.
//!
//! Transport adapters (webhook handlers, queue consumers) push signed
//! confirmations into a bounded channel; a single worker applies them
//! through the orchestrator. Transient store errors retry with
//! exponential backoff; permanent rejections are logged and dropped,
//! since redelivery can never make a forged signature valid.

use crate::confirmation::SignedConfirmation;
use crate::error::{Error, Result};
use crate::orchestrator::PaymentOrchestrator;
use backoff::ExponentialBackoffBuilder;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Cloneable handle that queues confirmations for the worker
#[derive(Clone)]
pub struct ConfirmationInbox {
    sender: mpsc::Sender<SignedConfirmation>,
}

impl ConfirmationInbox {
    /// Queue one confirmation, waiting if the buffer is full
    pub async fn deliver(&self, signed: SignedConfirmation) -> Result<()> {
        self.sender
            .send(signed)
            .await
            .map_err(|_| Error::ChannelClosed)
    }
}

/// Spawn the worker that applies queued confirmations in order.
///
/// The worker exits once every inbox handle has been dropped and the
/// queue is drained, which is how tests and shutdown paths flush it.
pub fn spawn_confirmation_worker(
    orchestrator: Arc<PaymentOrchestrator>,
    capacity: usize,
) -> (ConfirmationInbox, JoinHandle<()>) {
    let (sender, mut receiver) = mpsc::channel(capacity);
    let handle = tokio::spawn(async move {
        while let Some(signed) = receiver.recv().await {
            apply_with_retry(&orchestrator, signed).await;
        }
        debug!("Confirmation inbox drained; worker exiting");
    });
    (ConfirmationInbox { sender }, handle)
}

async fn apply_with_retry(orchestrator: &PaymentOrchestrator, signed: SignedConfirmation) {
    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(50))
        .with_max_interval(Duration::from_secs(2))
        .with_max_elapsed_time(Some(Duration::from_secs(30)))
        .build();

    let reference = signed.confirmation.processor_reference.clone();
    let result = backoff::future::retry(policy, || async {
        orchestrator.confirm_payment(&signed).map_err(|e| {
            if e.is_permanent() {
                backoff::Error::permanent(e)
            } else {
                backoff::Error::transient(e)
            }
        })
    })
    .await;

    match result {
        Ok(ack) => debug!(reference = %reference, ack = ?ack, "Confirmation applied"),
        Err(e) => warn!(reference = %reference, error = %e, "Confirmation dropped"),
    }
}
