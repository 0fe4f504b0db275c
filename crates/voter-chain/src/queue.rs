//! Single-worker action queue.
//!
//! All chain writes for the account funnel through one queue drained by
//! one worker task, so at most one transaction is in flight and nonces
//! stay strictly ordered. A failed job is logged and dropped; the worker
//! never exits on job failure.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::ChainError;

type Job = Pin<Box<dyn Future<Output = Result<(), ChainError>> + Send + 'static>>;

/// Cloneable handle for enqueueing chain actions.
#[derive(Clone)]
pub struct ActionQueue {
    tx: mpsc::UnboundedSender<(String, Job)>,
}

impl ActionQueue {
    #[must_use]
    pub fn new() -> (Self, ActionWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, ActionWorker { rx })
    }

    /// Enqueue one action. Actions run in submission order.
    pub fn enqueue<F>(&self, label: impl Into<String>, job: F)
    where
        F: Future<Output = Result<(), ChainError>> + Send + 'static,
    {
        let label = label.into();
        if self.tx.send((label.clone(), Box::pin(job))).is_err() {
            error!(label, "action queue closed, job dropped");
        }
    }
}

/// Drains the queue one job at a time.
pub struct ActionWorker {
    rx: mpsc::UnboundedReceiver<(String, Job)>,
}

impl ActionWorker {
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("action worker started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("action worker stopping");
                    break;
                }
                job = self.rx.recv() => {
                    let Some((label, job)) = job else {
                        info!("action queue closed, worker stopping");
                        break;
                    };
                    debug!(label, "running queued action");
                    if let Err(e) = job.await {
                        // Already classified and counted by the sender;
                        // the queue only guarantees forward progress.
                        error!(label, error = %e, "queued action failed");
                    }
                }
            }
        }
    }
}
