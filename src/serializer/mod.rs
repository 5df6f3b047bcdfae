//! Single-worker FIFO executor
//!
//! Every `*_locked` policy operation and every report a child pushes back
//! up runs as a job on one of these. Jobs run one at a time, in the order
//! they were scheduled, on a single spawned Tokio task.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SerializerError {
    #[error("Work serializer is closed")]
    Closed,

    #[error("Job was dropped before producing a result")]
    Dropped,
}

struct Shared {
    name: String,
    closed: AtomicBool,
    completed: AtomicU64,
}

/// Cloneable handle to a work serializer
#[derive(Clone)]
pub struct WorkSerializer {
    tx: mpsc::UnboundedSender<Job>,
    shared: Arc<Shared>,
}

impl WorkSerializer {
    /// Spawn the worker task. Must be called from within a Tokio runtime.
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            name: name.into(),
            closed: AtomicBool::new(false),
            completed: AtomicU64::new(0),
        });

        tokio::spawn(run_worker(rx, Arc::clone(&shared)));

        Self { tx, shared }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Enqueue a job without waiting for it
    pub fn schedule<F>(&self, job: F) -> Result<(), SerializerError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_closed() {
            return Err(SerializerError::Closed);
        }
        self.tx
            .send(Box::new(job))
            .map_err(|_| SerializerError::Closed)
    }

    /// Enqueue a job and wait for its return value
    pub async fn run<F, R>(&self, job: F) -> Result<R, SerializerError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        self.schedule(move || {
            let _ = result_tx.send(job());
        })?;
        result_rx.await.map_err(|_| SerializerError::Dropped)
    }

    /// Stop accepting new jobs. Jobs already queued still run.
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(serializer = %self.shared.name, "Work serializer closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst) || self.tx.is_closed()
    }

    /// Number of jobs that have finished running
    pub fn completed_jobs(&self) -> u64 {
        self.shared.completed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for WorkSerializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkSerializer")
            .field("name", &self.shared.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn run_worker(mut rx: mpsc::UnboundedReceiver<Job>, shared: Arc<Shared>) {
    tracing::debug!(serializer = %shared.name, "Work serializer started");

    while let Some(job) = rx.recv().await {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            tracing::error!(serializer = %shared.name, "Serialized job panicked");
        }
        shared.completed.fetch_add(1, Ordering::SeqCst);
    }

    tracing::debug!(serializer = %shared.name, "Work serializer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_run_returns_value() {
        let serializer = WorkSerializer::new("test");
        let value = serializer.run(|| 40 + 2).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(serializer.name(), "test");
    }

    #[tokio::test]
    async fn test_jobs_run_in_schedule_order() {
        let serializer = WorkSerializer::new("order");
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..100 {
            let log = Arc::clone(&log);
            serializer.schedule(move || log.lock().unwrap().push(i)).unwrap();
        }
        serializer.run(|| ()).await.unwrap();

        let log = log.lock().unwrap();
        assert_eq!(*log, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_jobs_never_overlap() {
        let serializer = WorkSerializer::new("exclusive");
        let running = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicU64::new(0));

        let mut producers = Vec::new();
        for _ in 0..4 {
            let serializer = serializer.clone();
            let running = Arc::clone(&running);
            let overlaps = Arc::clone(&overlaps);
            producers.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let running = Arc::clone(&running);
                    let overlaps = Arc::clone(&overlaps);
                    serializer
                        .schedule(move || {
                            if running.swap(true, Ordering::SeqCst) {
                                overlaps.fetch_add(1, Ordering::SeqCst);
                            }
                            std::thread::yield_now();
                            running.store(false, Ordering::SeqCst);
                        })
                        .unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }
        for producer in producers {
            producer.await.unwrap();
        }
        serializer.run(|| ()).await.unwrap();

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert!(serializer.completed_jobs() >= 200);
    }

    #[tokio::test]
    async fn test_close_rejects_new_jobs() {
        let serializer = WorkSerializer::new("closing");
        serializer.close();
        serializer.close();

        assert!(serializer.is_closed());
        assert_eq!(serializer.schedule(|| ()), Err(SerializerError::Closed));
        assert_eq!(serializer.run(|| 1).await, Err(SerializerError::Closed));
    }

    #[tokio::test]
    async fn test_queued_jobs_still_run_after_close() {
        let serializer = WorkSerializer::new("drain");
        let (tx, rx) = oneshot::channel();
        serializer
            .schedule(move || {
                let _ = tx.send("ran");
            })
            .unwrap();
        serializer.close();

        assert_eq!(rx.await.unwrap(), "ran");
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_stop_worker() {
        let serializer = WorkSerializer::new("panics");
        let result = serializer.run(|| -> u32 { panic!("boom") }).await;
        assert_eq!(result, Err(SerializerError::Dropped));

        let value = serializer.run(|| 7).await.unwrap();
        assert_eq!(value, 7);
    }
}
