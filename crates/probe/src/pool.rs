//! Bounded worker pool for expensive protocol probes.
//!
//! External probe processes are heavy, so they get their own, smaller pool
//! instead of riding the scan semaphores. Jobs flow through a bounded
//! channel (capacity twice the worker count) and results come back on
//! one-shot slots; both directions are bounded by the probe deadline so a
//! saturated pool surfaces backpressure instead of deadlocking.

use crate::executor::ProbeExecutor;
use dragnet_common::{DragnetError, DragnetResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

struct ProbeJob {
    ip: String,
    port: u16,
    modules: Vec<&'static str>,
    #[allow(dead_code)]
    priority: u8,
    slot: oneshot::Sender<DragnetResult<String>>,
}

enum Job {
    Probe(ProbeJob),
    Sentinel,
}

/// Fixed-size pool executing protocol probes with bounded parallelism.
pub struct ProbePool {
    tx: mpsc::Sender<Job>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
    deadline: Duration,
    cancel: CancellationToken,
    shut_down: AtomicBool,
}

impl ProbePool {
    /// Spawn `workers` workers backed by `executor`.
    #[must_use]
    pub fn new(workers: usize, deadline: Duration, executor: Arc<dyn ProbeExecutor>) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::channel::<Job>(workers * 2);
        let rx = Arc::new(Mutex::new(rx));
        let cancel = CancellationToken::new();

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let rx = rx.clone();
            let executor = executor.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(id, rx, executor, deadline, cancel).await;
            }));
        }

        Self {
            tx,
            workers: Mutex::new(handles),
            worker_count: workers,
            deadline,
            cancel,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Submit a probe and wait for its output.
    ///
    /// Returns `Backpressure` when the queue stays full past the probe
    /// deadline, `Timeout` when the result slot does not fill in time and
    /// `Shutdown` after the pool has been closed.
    pub async fn submit(
        &self,
        ip: &str,
        port: u16,
        modules: &[&'static str],
        priority: u8,
    ) -> DragnetResult<String> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(DragnetError::Shutdown);
        }

        let (slot_tx, slot_rx) = oneshot::channel();
        let job = Job::Probe(ProbeJob {
            ip: ip.to_string(),
            port,
            modules: modules.to_vec(),
            priority,
            slot: slot_tx,
        });

        match self.tx.send_timeout(job, self.deadline).await {
            Ok(()) => {}
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                return Err(DragnetError::Backpressure);
            }
            Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                return Err(DragnetError::Shutdown);
            }
        }

        match timeout(self.deadline, slot_rx).await {
            Ok(Ok(result)) => result,
            // worker dropped the slot without answering: pool going down
            Ok(Err(_)) => Err(DragnetError::Shutdown),
            Err(_) => Err(DragnetError::Timeout(format!(
                "probe result timed out for {ip}:{port}"
            ))),
        }
    }

    /// Shut the pool down: cancel in-flight probes, drain workers via one
    /// sentinel each and join them. Idempotent.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        self.cancel.cancel();
        for _ in 0..self.worker_count {
            // Best effort: workers also exit on cancellation, so a full
            // queue here is not a problem.
            let _ = self.tx.try_send(Job::Sentinel);
        }

        let mut handles = self.workers.lock().await;
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "probe worker panicked");
            }
        }
        debug!("probe pool shut down");
    }
}

async fn worker_loop(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    executor: Arc<dyn ProbeExecutor>,
    deadline: Duration,
    cancel: CancellationToken,
) {
    loop {
        let job = {
            let mut rx = rx.lock().await;
            tokio::select! {
                _ = cancel.cancelled() => None,
                job = rx.recv() => job,
            }
        };

        let job = match job {
            Some(Job::Probe(job)) => job,
            Some(Job::Sentinel) | None => break,
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(DragnetError::Cancelled),
            result = executor.execute(&job.ip, job.port, &job.modules, deadline) => result,
        };
        let cancelled = matches!(result, Err(DragnetError::Cancelled));

        // Slot receiver may have timed out already; that is fine.
        let _ = job.slot.send(result);

        if cancelled {
            break;
        }
    }
    debug!(worker = id, "probe worker exited");
}
