// src/load_balancer/scheduler.rs
use crate::proxy::{Backend, ProxyError};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Hands out backends to concurrent callers in strict cyclic order.
///
/// A single producer task walks the backend list forever and pushes each
/// entry into a channel whose capacity equals the number of backends, so it
/// never runs more than one full cycle ahead of consumption. Consumers share
/// the receiving end behind a fair mutex: the n-th satisfied `next()` always
/// gets `backends[(n - 1) % len]`.
pub struct Scheduler {
    receiver: Mutex<mpsc::Receiver<Arc<Backend>>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    producer: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Start a scheduler over `backends`. Must be called inside a tokio runtime.
    pub fn new(backends: Arc<[Arc<Backend>]>) -> Result<Self, ProxyError> {
        if backends.is_empty() {
            return Err(ProxyError::InvalidConfiguration);
        }

        let (tx, rx) = mpsc::channel(backends.len());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(backends = backends.len(), "starting round-robin scheduler");
        let producer = tokio::spawn(produce(backends, tx, shutdown_rx.clone()));

        Ok(Self {
            receiver: Mutex::new(rx),
            shutdown_tx,
            shutdown_rx,
            producer: Mutex::new(Some(producer)),
        })
    }

    /// Wait for the next backend in cycle order.
    ///
    /// Returns `SchedulerClosed` once `close()` has been called, including for
    /// callers that were already waiting. Buffered entries are never handed
    /// out after close.
    pub async fn next(&self) -> Result<Arc<Backend>, ProxyError> {
        let mut shutdown = self.shutdown_rx.clone();
        if *shutdown.borrow() {
            return Err(ProxyError::SchedulerClosed);
        }

        let mut receiver = self.receiver.lock().await;

        tokio::select! {
            biased;
            _ = shutdown.wait_for(|closed| *closed) => Err(ProxyError::SchedulerClosed),
            backend = receiver.recv() => backend.ok_or(ProxyError::SchedulerClosed),
        }
    }

    /// Stop the producer and wait for it to exit. Repeated calls are no-ops.
    pub async fn close(&self) {
        if self.shutdown_tx.send_replace(true) {
            debug!("scheduler already closed");
            return;
        }

        let producer = self.producer.lock().await.take();
        if let Some(producer) = producer {
            if let Err(e) = producer.await {
                tracing::error!(%e, "scheduler producer task failed");
            }
        }

        info!("round-robin scheduler closed");
    }

    #[cfg(test)]
    fn is_closed(&self) -> bool {
        *self.shutdown_rx.borrow()
    }
}

async fn produce(
    backends: Arc<[Arc<Backend>]>,
    tx: mpsc::Sender<Arc<Backend>>,
    mut shutdown: watch::Receiver<bool>,
) {
    for backend in backends.iter().cycle() {
        // Blocks while the buffer is full; shutdown is observed here too.
        tokio::select! {
            biased;
            _ = shutdown.wait_for(|closed| *closed) => break,
            permit = tx.reserve() => match permit {
                Ok(permit) => permit.send(backend.clone()),
                Err(_) => break,
            },
        }
    }

    debug!("scheduler producer stopped");
}
