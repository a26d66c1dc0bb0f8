use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::error::WorkerError;
use crate::jobs::{DocumentJob, JobStatus};
use crate::pipeline::Pipeline;

/// Whatever runs a job once a worker picks it up.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Must drive the job to a terminal state and not panic.
    async fn handle(&self, job: DocumentJob) -> JobStatus;
}

#[async_trait]
impl JobHandler for Pipeline {
    async fn handle(&self, job: DocumentJob) -> JobStatus {
        self.run_protected(job).await
    }
}

struct WorkItem {
    job: DocumentJob,
    reply: Option<oneshot::Sender<JobStatus>>,
}

/// Fixed set of tokio workers fed by a bounded queue.
pub struct WorkerPool {
    sender: mpsc::Sender<WorkItem>,
    workers: Vec<JoinHandle<()>>,
    capacity: usize,
}

/// A reserved place in the queue. Dropping it releases the place.
pub struct QueueSlot {
    permit: mpsc::OwnedPermit<WorkItem>,
}

impl QueueSlot {
    /// Hands the job to the pool without waiting for it.
    pub fn dispatch(self, job: DocumentJob) {
        self.permit.send(WorkItem { job, reply: None });
    }

    /// Hands the job to the pool; the receiver resolves with its final status.
    pub fn dispatch_with_reply(self, job: DocumentJob) -> oneshot::Receiver<JobStatus> {
        let (tx, rx) = oneshot::channel();
        self.permit.send(WorkItem {
            job,
            reply: Some(tx),
        });
        rx
    }
}

impl WorkerPool {
    /// Spawns `worker_count` workers on the current runtime.
    pub fn start(handler: Arc<dyn JobHandler>, worker_count: usize, queue_capacity: usize) -> Self {
        let worker_count = worker_count.max(1);
        let capacity = queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel::<WorkItem>(capacity);
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..worker_count)
            .map(|worker_id| {
                let receiver = Arc::clone(&receiver);
                let handler = Arc::clone(&handler);
                tokio::spawn(run_worker(worker_id, receiver, handler))
            })
            .collect();

        info!("Started {} workers (queue capacity {})", worker_count, capacity);

        Self {
            sender,
            workers,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Reserves a queue place without waiting.
    pub fn reserve(&self) -> Result<QueueSlot, WorkerError> {
        match self.sender.clone().try_reserve_owned() {
            Ok(permit) => Ok(QueueSlot { permit }),
            Err(mpsc::error::TrySendError::Full(_)) => Err(WorkerError::QueueFull {
                capacity: self.capacity,
            }),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(WorkerError::ChannelClosed),
        }
    }

    /// Reserves a queue place, waiting for one to free up.
    pub async fn reserve_wait(&self) -> Result<QueueSlot, WorkerError> {
        self.sender
            .clone()
            .reserve_owned()
            .await
            .map(|permit| QueueSlot { permit })
            .map_err(|_| WorkerError::ChannelClosed)
    }

    /// Stops accepting work, lets queued jobs finish and waits for workers.
    pub async fn shutdown(self) {
        info!("Shutting down worker pool...");
        drop(self.sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.await {
                error!("Worker {} ended abnormally: {}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }
}

async fn run_worker(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    handler: Arc<dyn JobHandler>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        // The lock is only held while waiting for the next item.
        let item = { receiver.lock().await.recv().await };
        let Some(item) = item else {
            debug!("Worker {} job channel closed", worker_id);
            break;
        };

        debug!("Worker {} processing job {}", worker_id, item.job.id);
        let status = handler.handle(item.job).await;

        if let Some(reply) = item.reply {
            // The waiter may have gone away; the job state is already stored.
            let _ = reply.send(status);
        }
    }

    debug!("Worker {} stopped", worker_id);
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::jobs::{DocumentKind, NewDocumentJob};

    struct Counting {
        handled: AtomicUsize,
    }

    #[async_trait]
    impl JobHandler for Counting {
        async fn handle(&self, _job: DocumentJob) -> JobStatus {
            self.handled.fetch_add(1, Ordering::SeqCst);
            JobStatus::Completed
        }
    }

    fn job() -> DocumentJob {
        DocumentJob::from_new(NewDocumentJob {
            owner_id: "owner-1".to_string(),
            original_filename: "r.png".to_string(),
            stored_filename: "r-stored.png".to_string(),
            file_path: PathBuf::from("/tmp/r-stored.png"),
            mime_type: "image/png".to_string(),
            size_bytes: 2048,
            kind: DocumentKind::Receipt,
        })
    }

    fn counting() -> Arc<Counting> {
        Arc::new(Counting {
            handled: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_full_queue_rejects_reservation() {
        let pool = WorkerPool::start(counting(), 1, 1);

        let slot = pool.reserve().unwrap();
        assert!(matches!(
            pool.reserve(),
            Err(WorkerError::QueueFull { capacity: 1 })
        ));

        drop(slot);
        assert!(pool.reserve().is_ok());
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_dispatch_with_reply() {
        let handler = counting();
        let pool = WorkerPool::start(handler.clone(), 2, 4);

        let rx = pool.reserve().unwrap().dispatch_with_reply(job());
        assert_eq!(rx.await.unwrap(), JobStatus::Completed);
        assert_eq!(handler.handled.load(Ordering::SeqCst), 1);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let handler = counting();
        let pool = WorkerPool::start(handler.clone(), 2, 8);

        for _ in 0..5 {
            pool.reserve().unwrap().dispatch(job());
        }
        pool.shutdown().await;

        assert_eq!(handler.handled.load(Ordering::SeqCst), 5);
    }
}
