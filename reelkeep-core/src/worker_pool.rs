use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Returned by [`JobBatch::submit`] once the pool has been shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("worker pool is shut down")]
pub struct PoolClosed;

#[derive(Debug)]
pub struct JobFailure<E> {
    pub label: String,
    pub error: E,
}

/// Outcome of every job submitted through one [`JobBatch`].
#[derive(Debug)]
pub struct PoolReport<T, E> {
    pub submitted: usize,
    /// Values of the jobs that succeeded, in completion order.
    pub outputs: Vec<T>,
    pub failures: Vec<JobFailure<E>>,
    /// Jobs that ended without reporting, i.e. panicked.
    pub lost: usize,
}

impl<T, E> Default for PoolReport<T, E> {
    fn default() -> Self {
        Self {
            submitted: 0,
            outputs: Vec::new(),
            failures: Vec::new(),
            lost: 0,
        }
    }
}

impl<T, E> PoolReport<T, E> {
    pub fn completed(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.lost == 0
    }
}

/// Bounded executor for catalog jobs.
///
/// `capacity` caps the number of jobs running at once across every batch.
/// Jobs are fire-and-forget for the submitter; their results come back
/// through [`JobBatch::finish`].
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    capacity: usize,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            tracker: TaskTracker::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Starts a group of jobs whose outcomes are collected together.
    pub fn batch<T, E>(&self) -> JobBatch<T, E>
    where
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        JobBatch {
            permits: Arc::clone(&self.permits),
            tracker: self.tracker.clone(),
            tx,
            rx,
            submitted: 0,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Stops accepting jobs and waits for in-flight ones to finish.
    pub async fn shutdown(&self) {
        self.tracker.close();
        debug!("Worker pool closed, waiting for {} jobs", self.tracker.len());
        self.tracker.wait().await;
    }
}

enum JobOutcome<T, E> {
    Completed(T),
    Failed(JobFailure<E>),
}

pub struct JobBatch<T, E> {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    tx: mpsc::UnboundedSender<JobOutcome<T, E>>,
    rx: mpsc::UnboundedReceiver<JobOutcome<T, E>>,
    submitted: usize,
}

impl<T, E> fmt::Debug for JobBatch<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobBatch")
            .field("submitted", &self.submitted)
            .finish_non_exhaustive()
    }
}

impl<T, E> JobBatch<T, E>
where
    T: Send + 'static,
    E: fmt::Display + Send + 'static,
{
    /// Queues `job`. Never waits for a free slot.
    pub fn submit<F>(&mut self, label: impl Into<String>, job: F) -> Result<(), PoolClosed>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        if self.tracker.is_closed() {
            return Err(PoolClosed);
        }

        let label = label.into();
        let permits = Arc::clone(&self.permits);
        let tx = self.tx.clone();
        self.submitted += 1;

        self.tracker.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            debug!(job = %label, "Starting job");
            let outcome = match job.await {
                Ok(value) => {
                    debug!(job = %label, "Finished job");
                    JobOutcome::Completed(value)
                }
                Err(error) => {
                    warn!(job = %label, "Job failed: {}", error);
                    JobOutcome::Failed(JobFailure { label, error })
                }
            };
            // The batch may have been dropped without finishing.
            let _ = tx.send(outcome);
        });
        Ok(())
    }

    /// Waits for every submitted job and aggregates their outcomes.
    pub async fn finish(self) -> PoolReport<T, E> {
        let JobBatch {
            tx, mut rx, submitted, ..
        } = self;
        drop(tx);

        let mut report = PoolReport {
            submitted,
            ..PoolReport::default()
        };
        while let Some(outcome) = rx.recv().await {
            match outcome {
                JobOutcome::Completed(value) => report.outputs.push(value),
                JobOutcome::Failed(failure) => report.failures.push(failure),
            }
        }
        report.lost = submitted - report.outputs.len() - report.failures.len();
        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_capacity() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut batch = pool.batch::<(), String>();
        for i in 0..8 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            batch
                .submit(format!("job-{i}"), async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
        }

        let report = batch.finish().await;
        assert_eq!(report.completed(), 8);
        assert!(report.is_clean());
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn failures_are_reported_not_propagated() {
        let pool = WorkerPool::new(4);
        let mut batch = pool.batch::<(), String>();
        batch.submit("ok", async { Ok(()) }).unwrap();
        batch
            .submit("broken", async { Err("catalog unavailable".to_string()) })
            .unwrap();
        batch.submit("ok-again", async { Ok(()) }).unwrap();

        let report = batch.finish().await;
        assert_eq!(report.submitted, 3);
        assert_eq!(report.completed(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].label, "broken");
        assert_eq!(report.failures[0].error, "catalog unavailable");
    }

    #[tokio::test]
    async fn stuck_job_does_not_delay_unrelated_job() {
        let pool = WorkerPool::new(2);
        let mut batch = pool.batch::<(), String>();
        let (done_tx, done_rx) = oneshot::channel();

        batch
            .submit("stuck", async {
                tokio::time::timeout(
                    Duration::from_millis(500),
                    std::future::pending::<()>(),
                )
                .await
                .map_err(|_| "timed out".to_string())
            })
            .unwrap();
        batch
            .submit("quick", async move {
                let _ = done_tx.send(());
                Ok(())
            })
            .unwrap();

        tokio::time::timeout(Duration::from_millis(200), done_rx)
            .await
            .expect("quick job should finish while the other is stuck")
            .unwrap();

        let report = batch.finish().await;
        assert_eq!(report.completed(), 1);
        assert_eq!(report.failures.len(), 1);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_jobs_and_waits_for_running_ones() {
        let pool = WorkerPool::new(1);
        let finished = Arc::new(AtomicUsize::new(0));

        let mut batch = pool.batch::<(), String>();
        let counter = Arc::clone(&finished);
        batch
            .submit("slow", async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        pool.shutdown().await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert!(pool.is_closed());
        assert_eq!(
            batch.submit("late", async { Ok(()) }),
            Err(PoolClosed)
        );
    }
}
