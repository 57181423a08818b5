//! Background queue for metadata bookkeeping.
//!
//! Generation returns as soon as the artifact is written. Computing versions
//! and persisting the sidecar happen on a single worker thread fed by a
//! bounded channel. When the queue is full the job is dropped with a warning:
//! a missing sidecar only makes the artifact show up as an orphan.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

/// Default number of queued jobs before new ones are dropped.
pub const DEFAULT_CAPACITY: usize = 256;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn start(&self) {
        *self.count.lock().unwrap() += 1;
    }

    fn finish(&self) {
        let mut count = self.count.lock().unwrap();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self) {
        let mut count = self.count.lock().unwrap();
        while *count > 0 {
            count = self.idle.wait(count).unwrap();
        }
    }
}

/// Fire-and-forget job queue with a [`flush`](Self::flush) hook.
pub struct MetadataWriter {
    sender: Option<SyncSender<Job>>,
    pending: Arc<Pending>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for MetadataWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataWriter")
            .field("pending", &*self.pending.count.lock().unwrap())
            .finish_non_exhaustive()
    }
}

impl Default for MetadataWriter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl MetadataWriter {
    /// Start the worker thread with a queue of `capacity` jobs.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::sync_channel::<Job>(capacity);
        let pending = Arc::new(Pending::default());
        let worker_pending = Arc::clone(&pending);

        let worker = std::thread::Builder::new()
            .name("vellum-metadata".to_owned())
            .spawn(move || {
                for job in receiver {
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        tracing::error!("Metadata job panicked");
                    }
                    worker_pending.finish();
                }
            });

        match worker {
            Ok(worker) => Self {
                sender: Some(sender),
                pending,
                worker: Some(worker),
            },
            Err(e) => {
                tracing::error!("Cannot start metadata worker, metadata will not be written: {e}");
                Self {
                    sender: None,
                    pending,
                    worker: None,
                }
            }
        }
    }

    /// Queue a job without waiting for it.
    ///
    /// Returns `false` if the job was dropped.
    pub fn schedule(&self, job: impl FnOnce() + Send + 'static) -> bool {
        let Some(sender) = &self.sender else {
            return false;
        };
        self.pending.start();
        match sender.try_send(Box::new(job)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Metadata queue full, dropping job");
                self.pending.finish();
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::warn!("Metadata worker stopped, dropping job");
                self.pending.finish();
                false
            }
        }
    }

    /// Block until every queued job has run.
    pub fn flush(&self) {
        self.pending.wait_idle();
    }

    /// Number of queued or running jobs.
    #[must_use]
    pub fn pending(&self) -> usize {
        *self.pending.count.lock().unwrap()
    }
}

impl Drop for MetadataWriter {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::warn!("Metadata worker exited abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::channel;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_flush_waits_for_jobs() {
        let writer = MetadataWriter::default();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let done = Arc::clone(&done);
            assert!(writer.schedule(move || {
                std::thread::sleep(Duration::from_millis(2));
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }
        writer.flush();

        assert_eq!(done.load(Ordering::SeqCst), 10);
        assert_eq!(writer.pending(), 0);
    }

    #[test]
    fn test_flush_without_jobs_returns() {
        MetadataWriter::default().flush();
    }

    #[test]
    fn test_full_queue_drops_job() {
        let writer = MetadataWriter::new(1);
        let (release_tx, release_rx) = channel::<()>();
        let (started_tx, started_rx) = channel::<()>();

        // Occupy the worker, then fill the single queue slot.
        assert!(writer.schedule(move || {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        }));
        started_rx.recv().unwrap();
        assert!(writer.schedule(|| {}));

        assert!(!writer.schedule(|| {}));

        release_tx.send(()).unwrap();
        writer.flush();
        assert_eq!(writer.pending(), 0);
    }

    #[test]
    fn test_panicking_job_does_not_stop_worker() {
        let writer = MetadataWriter::default();
        let done = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&done);

        writer.schedule(|| panic!("boom"));
        writer.schedule(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        writer.flush();

        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_writer_is_send_sync() {
        static_assertions::assert_impl_all!(MetadataWriter: Send, Sync);
    }
}
