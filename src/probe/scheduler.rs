//! Bounded probe scheduler
//!
//! A fixed pool of worker tasks pulling from a bounded job queue. Submission
//! never waits: a full queue rejects the job and the caller decides when to
//! retry.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::logging::{ErrorCategory, log_debug_simple, log_error_simple, log_warning_simple};

/// A unit of probe work. Jobs own everything they touch.
pub type ProbeJob = BoxFuture<'static, ()>;

/// Scheduler status for reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerStatus {
    pub workers: usize,
    pub capacity: usize,
    pub active: usize,
    pub accepting: bool,
}

pub struct ProbeScheduler {
    workers: usize,
    capacity: usize,
    sender: Mutex<Option<mpsc::Sender<ProbeJob>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    active: Arc<AtomicUsize>,
}

impl ProbeScheduler {
    /// Start `workers` worker tasks over a queue holding `capacity` jobs.
    /// Both are raised to at least 1. Must be called inside a tokio runtime.
    pub fn new(workers: usize, capacity: usize) -> Self {
        let workers = workers.max(1);
        let capacity = capacity.max(1);

        let (tx, rx) = mpsc::channel::<ProbeJob>(capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let active = Arc::new(AtomicUsize::new(0));

        let handles = (0..workers)
            .map(|worker| tokio::spawn(worker_loop(worker, Arc::clone(&rx), Arc::clone(&active))))
            .collect();

        log_debug_simple(
            ErrorCategory::Scheduler,
            &format!("Probe scheduler started: {} workers, queue capacity {}", workers, capacity),
        );

        Self {
            workers,
            capacity,
            sender: Mutex::new(Some(tx)),
            handles: Mutex::new(handles),
            active,
        }
    }

    /// Queue a job. Returns false if the queue is full or the scheduler was
    /// shut down; the job is dropped in that case.
    pub fn submit(&self, job: ProbeJob) -> bool {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            return false;
        };

        match sender.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log_debug_simple(ErrorCategory::Scheduler, "Probe queue full, job rejected");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Jobs currently executing on a worker.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            workers: self.workers,
            capacity: self.capacity,
            active: self.active_count(),
            accepting: self.is_accepting(),
        }
    }

    /// Stop accepting jobs, let queued and running jobs finish, and wait for
    /// every worker to exit. Safe to call more than once.
    pub async fn shutdown(&self) {
        drop(self.sender.lock().unwrap_or_else(PoisonError::into_inner).take());

        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner));
        for handle in handles {
            if let Err(e) = handle.await {
                log_warning_simple(ErrorCategory::Scheduler, &format!("Probe worker ended abnormally: {}", e));
            }
        }
    }
}

impl Drop for ProbeScheduler {
    fn drop(&mut self) {
        let handles = self.handles.get_mut().unwrap_or_else(PoisonError::into_inner);
        for handle in handles.drain(..) {
            handle.abort();
        }
    }
}

async fn worker_loop(
    worker: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<ProbeJob>>>,
    active: Arc<AtomicUsize>,
) {
    loop {
        // Hold the receiver lock only while waiting for the next job
        let job = rx.lock().await.recv().await;
        let Some(job) = job else { break };

        active.fetch_add(1, Ordering::SeqCst);
        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
            log_error_simple(
                ErrorCategory::Scheduler,
                &format!("Probe job panicked on worker {}", worker),
                None,
            );
        }
        active.fetch_sub(1, Ordering::SeqCst);
    }

    log_debug_simple(ErrorCategory::Scheduler, &format!("Probe worker {} stopped", worker));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn gated_job(gate: Arc<Notify>) -> ProbeJob {
        async move { gate.notified().await }.boxed()
    }

    fn item_is_broken() -> bool {
        true
    }

    async fn wait_for_active(scheduler: &ProbeScheduler, expected: usize) {
        for _ in 0..200 {
            if scheduler.active_count() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} active jobs, got {}", expected, scheduler.active_count());
    }

    #[tokio::test]
    async fn rejects_excess_jobs_without_blocking() {
        let scheduler = ProbeScheduler::new(2, 4);
        let gate = Arc::new(Notify::new());

        assert!(scheduler.submit(gated_job(Arc::clone(&gate))));
        assert!(scheduler.submit(gated_job(Arc::clone(&gate))));
        wait_for_active(&scheduler, 2).await;

        for _ in 0..4 {
            assert!(scheduler.submit(gated_job(Arc::clone(&gate))));
        }
        let started = std::time::Instant::now();
        assert!(!scheduler.submit(gated_job(Arc::clone(&gate))));
        assert!(!scheduler.submit(gated_job(Arc::clone(&gate))));
        assert!(started.elapsed() < Duration::from_millis(100));

        gate.notify_waiters();
    }

    #[tokio::test]
    async fn runs_every_accepted_job() {
        let scheduler = ProbeScheduler::new(2, 16);
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let done = Arc::clone(&done);
            assert!(scheduler.submit(
                async move {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    done.fetch_add(1, Ordering::SeqCst);
                }
                .boxed()
            ));
        }

        scheduler.shutdown().await;
        assert_eq!(done.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn panicking_job_does_not_kill_the_pool() {
        let scheduler = ProbeScheduler::new(1, 4);
        let done = Arc::new(AtomicUsize::new(0));

        let bad_item = async {
            if item_is_broken() {
                panic!("bad item");
            }
        };
        assert!(scheduler.submit(bad_item.boxed()));
        let counter = Arc::clone(&done);
        assert!(scheduler.submit(
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        ));

        scheduler.shutdown().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.active_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_stops_accepting() {
        let scheduler = ProbeScheduler::new(1, 1);
        scheduler.shutdown().await;

        assert!(!scheduler.is_accepting());
        assert!(!scheduler.submit(async {}.boxed()));
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn zero_sizes_are_raised_to_one() {
        let scheduler = ProbeScheduler::new(0, 0);
        let status = scheduler.status();

        assert_eq!(status.workers, 1);
        assert_eq!(status.capacity, 1);
        assert!(status.accepting);
        assert_eq!(status.active, 0);
    }
}
