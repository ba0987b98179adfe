//! Background worker that mirrors counters to a store.
//!
//! Admission decisions never wait on the store. The limiter hands each record
//! to a [`MirrorHandle`], which pushes it onto an unbounded channel; a single
//! worker task drains the channel in order and writes to the store. Write
//! failures are logged and counted, then dropped. Nothing is retried.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::record::RateLimitRecord;
use super::store::RateLimitStore;

enum MirrorCommand {
    Upsert(RateLimitRecord),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Counters describing what the worker has done so far.
#[derive(Debug, Default)]
pub struct MirrorStats {
    written: AtomicU64,
    failed: AtomicU64,
}

impl MirrorStats {
    /// Records successfully written.
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Records whose write failed and were dropped.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Cheap, cloneable sender side of the mirror.
#[derive(Debug, Clone)]
pub struct MirrorHandle {
    tx: mpsc::UnboundedSender<MirrorCommand>,
}

impl MirrorHandle {
    /// Queue a record for writing. Never blocks and never fails the caller.
    pub fn submit(&self, record: RateLimitRecord) {
        if let Err(mpsc::error::SendError(MirrorCommand::Upsert(record))) =
            self.tx.send(MirrorCommand::Upsert(record))
        {
            warn!(
                session_id = %record.session_id,
                "Persistence mirror stopped, dropping rate limit record"
            );
        }
    }
}

/// Owner of the mirror worker task.
pub struct PersistenceMirror {
    handle: MirrorHandle,
    stats: Arc<MirrorStats>,
    worker: JoinHandle<()>,
}

impl PersistenceMirror {
    /// Spawn the worker on the current Tokio runtime.
    pub fn spawn<S>(store: Arc<S>) -> Self
    where
        S: RateLimitStore + ?Sized + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(MirrorStats::default());
        let worker = tokio::spawn(run_worker(store, rx, stats.clone()));

        info!("Persistence mirror started");

        Self {
            handle: MirrorHandle { tx },
            stats,
            worker,
        }
    }

    /// Get a handle for submitting records.
    pub fn handle(&self) -> MirrorHandle {
        self.handle.clone()
    }

    /// Get the worker's counters.
    pub fn stats(&self) -> Arc<MirrorStats> {
        self.stats.clone()
    }

    /// Wait until every record submitted before this call has been attempted.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.handle.tx.send(MirrorCommand::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Drain queued records and stop the worker.
    ///
    /// Records submitted after this returns are dropped with a warning.
    pub async fn shutdown(self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.handle.tx.send(MirrorCommand::Shutdown(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }

        if let Err(e) = self.worker.await {
            warn!(error = %e, "Persistence mirror worker ended abnormally");
        }

        info!(
            written = self.stats.written(),
            failed = self.stats.failed(),
            "Persistence mirror stopped"
        );
    }
}

async fn run_worker<S>(
    store: Arc<S>,
    mut rx: mpsc::UnboundedReceiver<MirrorCommand>,
    stats: Arc<MirrorStats>,
) where
    S: RateLimitStore + ?Sized,
{
    let mut shutdown_ack = None;

    while let Some(command) = rx.recv().await {
        match command {
            MirrorCommand::Upsert(record) => write_record(&*store, record, &stats).await,
            MirrorCommand::Flush(ack) => {
                let _ = ack.send(());
            }
            MirrorCommand::Shutdown(ack) => {
                // Later submits fail fast; anything already queued is still drained.
                rx.close();
                shutdown_ack = Some(ack);
            }
        }
    }

    if let Some(ack) = shutdown_ack {
        let _ = ack.send(());
    }
}

async fn write_record<S>(store: &S, record: RateLimitRecord, stats: &MirrorStats)
where
    S: RateLimitStore + ?Sized,
{
    let session_id = record.session_id.clone();
    match store.upsert(record).await {
        Ok(()) => {
            stats.written.fetch_add(1, Ordering::Relaxed);
            debug!(session_id = %session_id, "Mirrored rate limit counters");
        }
        Err(e) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                session_id = %session_id,
                error = %e,
                "Failed to persist rate limit data"
            );
        }
    }
}
