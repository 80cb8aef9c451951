//! Dispatch pool moving admission requests off the checking thread.
//!
//! A fixed set of dedicated OS threads drain a bounded crossbeam queue. Each
//! job performs exactly one `bus.send` and then forgets the request; the reply
//! arrives through the bus callback straight into the job's [`ReplySlot`].
//! Workers never wait for replies, so a slow decision service cannot pin a
//! worker beyond the send itself.
//!
//! # Design Principles
//!
//! - **No polling**: workers block on `recv`; submitters block on
//!   `send_deadline` bounded by the check's own deadline
//! - **Stale work is dropped**: a job picked up after its deadline is
//!   abandoned without touching the bus
//! - **Clean shutdown**: dropping the sender unblocks every idle worker

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::bus::MessageBus;
use super::error::BridgeError;
use super::reply::ReplySlot;

/// How long [`DispatchPool::shutdown`] waits for each worker to exit.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// One request to deliver on behalf of a waiting check.
#[derive(Debug)]
pub struct DispatchJob {
    /// Correlation id used in logs.
    pub check_id: u64,
    /// Target address (the registered decision service).
    pub address: String,
    /// Request body.
    pub request: Value,
    /// Where the reply (or the send failure) goes.
    pub slot: ReplySlot,
    /// The waiting check gives up at this instant.
    pub deadline: Instant,
}

/// Snapshot of dispatch activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Jobs accepted by [`DispatchPool::submit`].
    pub submitted: u64,
    /// Jobs handed to the bus successfully.
    pub dispatched: u64,
    /// Jobs dropped because their deadline passed while queued.
    pub abandoned: u64,
    /// Jobs the bus refused.
    pub send_failures: u64,
}

#[derive(Debug, Default)]
struct DispatchCounters {
    submitted: AtomicU64,
    dispatched: AtomicU64,
    abandoned: AtomicU64,
    send_failures: AtomicU64,
}

impl DispatchCounters {
    fn snapshot(&self, worker_count: usize) -> DispatchStats {
        DispatchStats {
            worker_count,
            submitted: self.submitted.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }
}

/// Fixed pool of dispatch workers sharing one bus handle.
pub struct DispatchPool {
    worker_count: usize,
    job_tx: Mutex<Option<Sender<DispatchJob>>>,
    counters: Arc<DispatchCounters>,
    shutdown: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for DispatchPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchPool")
            .field("worker_count", &self.worker_count)
            .field("shutdown", &self.shutdown.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl DispatchPool {
    /// Spawn `worker_count` workers over a queue of `queue_depth` slots.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidConfig`] for a zero worker count or
    /// queue depth, and [`BridgeError::Internal`] if a thread cannot be
    /// spawned.
    pub fn new(
        bus: Arc<dyn MessageBus>,
        worker_count: usize,
        queue_depth: usize,
        stack_size: usize,
    ) -> Result<Self, BridgeError> {
        if worker_count == 0 {
            return Err(BridgeError::InvalidConfig(
                "dispatch_workers must be greater than 0".into(),
            ));
        }
        if queue_depth == 0 {
            return Err(BridgeError::InvalidConfig(
                "max_pending_checks must be greater than 0".into(),
            ));
        }

        let (job_tx, job_rx) = bounded::<DispatchJob>(queue_depth);
        let counters = Arc::new(DispatchCounters::default());
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let worker = spawn_worker(
                worker_id,
                job_rx.clone(),
                Arc::clone(&bus),
                Arc::clone(&counters),
                Arc::clone(&shutdown),
                stack_size,
            )?;
            workers.push(worker);
        }

        info!(worker_count, queue_depth, "dispatch pool started");

        Ok(Self {
            worker_count,
            job_tx: Mutex::new(Some(job_tx)),
            counters,
            shutdown,
            workers: Mutex::new(workers),
        })
    }

    /// Queue a job, blocking no later than the job's own deadline.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Timeout`] if every queue slot stayed occupied until
    ///   the deadline
    /// - [`BridgeError::PoolShutdown`] once the pool has been shut down
    pub fn submit(&self, job: DispatchJob) -> Result<(), BridgeError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(BridgeError::PoolShutdown);
        }
        // Clone out so a saturated queue does not hold the lock.
        let Some(job_tx) = self.job_tx.lock().clone() else {
            return Err(BridgeError::PoolShutdown);
        };

        let check_id = job.check_id;
        let deadline = job.deadline;
        match job_tx.send_deadline(job, deadline) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                debug!(check_id, "canRun job queued");
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => {
                warn!(check_id, "dispatch queue saturated until deadline");
                Err(BridgeError::Timeout)
            }
            Err(SendTimeoutError::Disconnected(_)) => Err(BridgeError::PoolShutdown),
        }
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot(self.worker_count)
    }

    /// Whether [`DispatchPool::shutdown`] has run (or the pool was dropped).
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Stop accepting work and join the workers.
    ///
    /// Workers that do not exit within two seconds are detached.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        info!("shutting down dispatch pool");
        *self.job_tx.lock() = None;

        let mut workers = self.workers.lock();
        let worker_count = workers.len();
        for (idx, worker) in workers.drain(..).enumerate() {
            let (tx, rx) = crossbeam_channel::bounded(1);
            let join_thread = thread::spawn(move || {
                let joined = worker.join().is_ok();
                let _ = tx.send(joined);
            });
            match rx.recv_timeout(JOIN_TIMEOUT) {
                Ok(true) => debug!(worker_id = idx, "worker joined"),
                Ok(false) => warn!(worker_id = idx, "worker panicked"),
                Err(_) => {
                    warn!(worker_id = idx, "worker did not exit within timeout; detaching");
                    continue;
                }
            }
            let _ = join_thread.join();
        }

        info!(worker_count, "dispatch pool shut down");
    }
}

impl Drop for DispatchPool {
    fn drop(&mut self) {
        // Signal only; joining belongs to an explicit shutdown().
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            *self.job_tx.lock() = None;
            debug!("dispatch pool dropped without shutdown; workers detached");
        }
    }
}

fn spawn_worker(
    worker_id: usize,
    job_rx: Receiver<DispatchJob>,
    bus: Arc<dyn MessageBus>,
    counters: Arc<DispatchCounters>,
    shutdown: Arc<AtomicBool>,
    stack_size: usize,
) -> Result<JoinHandle<()>, BridgeError> {
    thread::Builder::new()
        .name(format!("admission-dispatch-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || {
            debug!(worker_id, "dispatch worker started");
            while let Ok(job) = job_rx.recv() {
                if shutdown.load(Ordering::Acquire) {
                    break;
                }
                deliver(worker_id, job, bus.as_ref(), &counters);
            }
            debug!(worker_id, "dispatch worker exiting");
        })
        .map_err(|e| BridgeError::Internal(format!("failed to spawn dispatch worker: {e}")))
}

fn deliver(worker_id: usize, job: DispatchJob, bus: &dyn MessageBus, counters: &DispatchCounters) {
    let DispatchJob {
        check_id,
        address,
        request,
        slot,
        deadline,
    } = job;

    if Instant::now() >= deadline {
        counters.abandoned.fetch_add(1, Ordering::Relaxed);
        debug!(worker_id, check_id, handler = %address, "deadline passed before dispatch; abandoning");
        return;
    }

    let reply_slot = slot.clone();
    let on_reply = Box::new(move |reply: Value| {
        reply_slot.fulfil(Ok(reply));
    });
    match bus.send(&address, request, on_reply) {
        Ok(()) => {
            counters.dispatched.fetch_add(1, Ordering::Relaxed);
            debug!(worker_id, check_id, handler = %address, "canRun sent");
        }
        Err(err) => {
            counters.send_failures.fetch_add(1, Ordering::Relaxed);
            error!(worker_id, check_id, handler = %address, error = %err, "unable to send canRun request");
            slot.fulfil(Err(BridgeError::SendFailed(err.to_string())));
        }
    }
}
