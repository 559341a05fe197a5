//! # Dispatch Worker Pool
//!
//! Purpose: Run fire-and-forget routines (subscription listen loops) on a
//! bounded set of background threads so callers return immediately.
//!
//! ## Design Principles
//! 1. **Bounded Workers**: A fixed thread count, created at client startup
//!    and joined at explicit shutdown; never an unsupervised spawn-per-call.
//! 2. **Observable Failures**: A panicking job is logged and the worker keeps
//!    serving; nothing disappears into an unobserved thread.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use tracing::{debug, error};

use crate::error::GatewayResult;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug)]
pub(crate) struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub(crate) fn new(size: usize) -> GatewayResult<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let mut workers = Vec::with_capacity(size.max(1));

        for idx in 0..size.max(1) {
            let receiver = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("redpool-dispatch-{idx}"))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
                            error!(
                                reason = panic_message(payload.as_ref()),
                                "dispatched job panicked"
                            );
                        }
                    }
                })?;
            workers.push(handle);
        }

        Ok(WorkerPool {
            sender: Some(sender),
            workers,
        })
    }

    /// Submits a job; returns immediately. Jobs submitted after shutdown are
    /// silently dropped, matching the fire-and-forget contract.
    pub(crate) fn execute(&self, job: impl FnOnce() + Send + 'static) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(Box::new(job));
        }
    }

    /// Closes the queue and joins the workers. Already-queued jobs still run.
    pub(crate) fn shutdown(&mut self) {
        if let Some(sender) = self.sender.take() {
            drop(sender);
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        debug!("dispatch workers stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn jobs_run_on_background_threads() {
        let pool = WorkerPool::new(2).expect("workers");
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let counter = counter.clone();
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while counter.load(Ordering::SeqCst) < 8 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::new(1).expect("workers");
        let done = Arc::new(AtomicUsize::new(0));
        pool.execute(|| panic!("boom"));
        let flag = done.clone();
        pool.execute(move || {
            flag.store(1, Ordering::SeqCst);
        });
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while done.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shutdown_runs_queued_jobs_before_joining() {
        let mut pool = WorkerPool::new(1).expect("workers");
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let counter = counter.clone();
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }
}
