//! Bounded worker pool
//!
//! Wraps Tokio task spawning with a fixed concurrency cap and a result
//! channel. The contract the survey loop depends on: a submission
//! either fails fast (pool full or shut down) or eventually produces
//! exactly one result envelope, even if the work panics. Capacity is
//! released as soon as the work finishes, not when the envelope is
//! polled.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use starsweep_common::events::PoolSnapshot;
use starsweep_common::{Error, Result, TargetId};

/// One envelope per submission. A panic inside the work surfaces here
/// as `Err(Error::Internal)` rather than poisoning the pool.
pub struct PoolResult<R> {
    pub target: TargetId,
    pub outcome: Result<R>,
}

pub struct WorkerPool<R> {
    capacity: usize,
    stats: Arc<Mutex<PoolSnapshot>>,
    results_tx: mpsc::UnboundedSender<PoolResult<R>>,
    results_rx: mpsc::UnboundedReceiver<PoolResult<R>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shutting_down: AtomicBool,
}

impl<R: Send + 'static> WorkerPool<R> {
    pub fn new(capacity: usize) -> Self {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        WorkerPool {
            capacity: capacity.max(1),
            stats: Arc::new(Mutex::new(PoolSnapshot::default())),
            results_tx,
            results_rx,
            handles: Mutex::new(Vec::new()),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Targets currently being worked on
    pub fn active_count(&self) -> usize {
        self.stats.lock().unwrap().in_progress
    }

    pub fn has_capacity(&self) -> bool {
        self.active_count() < self.capacity
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        self.stats.lock().unwrap().clone()
    }

    /// Hand work to the pool. Fails fast with [`Error::PoolSaturated`]
    /// when at capacity; the caller is expected to drain results and
    /// try again.
    pub fn submit<F>(&self, target: TargetId, work: F) -> Result<()>
    where
        F: Future<Output = R> + Send + 'static,
    {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(Error::PoolShutDown);
        }
        {
            let mut stats = self.stats.lock().unwrap();
            if stats.in_progress >= self.capacity {
                return Err(Error::PoolSaturated);
            }
            stats.submitted += 1;
            stats.in_progress += 1;
        }

        let stats = Arc::clone(&self.stats);
        let tx = self.results_tx.clone();
        let task_target = target.clone();
        let handle = tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(work).catch_unwind().await {
                Ok(result) => Ok(result),
                Err(payload) => {
                    let detail = panic_message(payload);
                    warn!(target = %task_target, detail = %detail, "Worker panicked");
                    Err(Error::Internal(format!("worker panicked: {detail}")))
                }
            };
            {
                let mut stats = stats.lock().unwrap();
                stats.in_progress -= 1;
                stats.completed += 1;
            }
            // Receiver dropped means the pool is gone; nothing to do
            let _ = tx.send(PoolResult { target: task_target, outcome });
        });

        let mut handles = self.handles.lock().unwrap();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        debug!(target = %target, "Submitted to pool");
        Ok(())
    }

    /// Wait up to `timeout` for the next completed envelope
    pub async fn poll_result(&mut self, timeout: Duration) -> Option<PoolResult<R>> {
        tokio::time::timeout(timeout, self.results_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Drain an envelope without waiting
    pub fn try_result(&mut self) -> Option<PoolResult<R>> {
        self.results_rx.try_recv().ok()
    }

    /// Stop accepting work. With `wait`, joins every in-flight task so
    /// their envelopes are all queued before this returns.
    pub async fn shutdown(&self, wait: bool) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock().unwrap());
        if wait {
            for handle in handles {
                // Panics were already converted to envelopes
                let _ = handle.await;
            }
        } else {
            for handle in handles {
                handle.abort();
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
