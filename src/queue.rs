//! Global download queue and worker pool.
//!
//! A single unbounded FIFO queue of [`DownloadTask`]s is drained by
//! `max_connections` workers. Each worker:
//!
//! 1. Waits for a task, respecting the shutdown token.
//! 2. Resolves the pending track (provider API calls happen here, under
//!    the provider's own limiters, so media URLs are fetched at
//!    execution time and never expire in the queue).
//! 3. Runs the track lifecycle: byte transfer under the global transfer
//!    semaphore, validation, tagging, conversion, ledger write.
//!
//! # Retry policy
//!
//! Retryable (transport-level) failures re-queue the task with a sleep
//! of `retry_count * 2` seconds; after three attempts the task is
//! recorded as failed and discarded. Terminal kinds (not streamable,
//! tagging, oversized cover) fail immediately.
//!
//! # Completion signalling
//!
//! Every submitted task carries a oneshot sender fired exactly once when
//! the task terminates - success, skip, or final failure. Containers
//! hold the receivers, which is how an album knows all of its tracks
//! have terminated before it checks the ledger for completeness.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::{
    sync::{mpsc, oneshot, Mutex, OwnedSemaphorePermit, Semaphore},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    client::{MediaKind, Source},
    db::Ledger,
    error::{Error, Result},
    media::Pending,
};

/// Attempts before a task is recorded as failed and discarded.
const MAX_RETRIES: u32 = 3;

/// One unit of queued work: a pending track and its bookkeeping.
pub struct DownloadTask {
    /// The track to resolve and rip.
    pub pending: Box<dyn Pending>,

    /// Human-readable description for log lines.
    pub descriptor: String,

    /// Provider namespace for ledger writes.
    pub source: Source,

    /// Track id for ledger writes.
    pub track_id: String,

    /// Number of times this task has been re-queued.
    pub retry_count: u32,

    /// Fired exactly once when the task terminates.
    done: Option<oneshot::Sender<()>>,
}

impl DownloadTask {
    fn signal_done(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}

/// Session counters for the shutdown summary.
#[derive(Default)]
pub struct Stats {
    total: AtomicUsize,
    failed: AtomicUsize,
}

impl Stats {
    /// Items that entered the pipeline.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    /// Items that terminated in failure.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Cloneable handle for submitting work and sharing the limiters.
#[derive(Clone)]
pub struct QueueHandle {
    sender: mpsc::UnboundedSender<DownloadTask>,
    transfers: Arc<Semaphore>,
    shutdown: CancellationToken,
    stats: Arc<Stats>,
}

impl QueueHandle {
    /// Submits a pending track and returns its completion receiver.
    pub fn submit(
        &self,
        pending: Box<dyn Pending>,
        descriptor: String,
        source: Source,
        track_id: String,
    ) -> oneshot::Receiver<()> {
        let (done, completion) = oneshot::channel();
        self.stats.total.fetch_add(1, Ordering::Relaxed);

        let task = DownloadTask {
            pending,
            descriptor,
            source,
            track_id,
            retry_count: 0,
            done: Some(done),
        };

        if self.sender.send(task).is_err() {
            // Queue already shut down; the dropped sender resolves the
            // receiver immediately.
            debug!("queue closed, dropping task");
        }
        completion
    }

    /// Acquires a global byte-transfer permit.
    ///
    /// Applied around the transfer phase only, decoupled from the
    /// per-provider API limiters.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Cancelled` when the session is shutting down.
    pub async fn transfer_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.transfers
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::cancelled(e.to_string()))
    }

    /// Whether shutdown has been signalled.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Session counters.
    #[must_use]
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Counts an item that entered the pipeline outside the queue
    /// (single tracks ripped directly).
    pub fn count_item(&self) {
        self.stats.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a terminal failure recorded outside the worker loop
    /// (resolver-level quality refusals and unstreamable tracks).
    pub fn count_failure(&self) {
        self.stats.failed.fetch_add(1, Ordering::Relaxed);
    }
}

/// The worker pool draining the global queue.
pub struct WorkerPool {
    handle: QueueHandle,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<DownloadTask>>>,
    ledger: Arc<Ledger>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Creates the pool and its queue. Workers are not running until
    /// [`start`](Self::start).
    #[must_use]
    pub fn new(max_connections: usize, ledger: Arc<Ledger>, shutdown: CancellationToken) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = QueueHandle {
            sender,
            transfers: Arc::new(Semaphore::new(max_connections.max(1))),
            shutdown,
            stats: Arc::new(Stats::default()),
        };

        Self {
            handle,
            receiver: Arc::new(Mutex::new(receiver)),
            ledger,
            workers: Vec::new(),
        }
    }

    /// Cloneable submission handle.
    #[must_use]
    pub fn handle(&self) -> QueueHandle {
        self.handle.clone()
    }

    /// Spawns `count` workers.
    pub fn start(&mut self, count: usize) {
        debug!("starting {count} download workers");
        for index in 0..count.max(1) {
            let receiver = Arc::clone(&self.receiver);
            let handle = self.handle.clone();
            let ledger = Arc::clone(&self.ledger);
            self.workers.push(tokio::spawn(async move {
                Self::worker(index, receiver, handle, ledger).await;
            }));
        }
    }

    /// Signals shutdown and waits for the workers to exit.
    ///
    /// Workers finish their in-flight task checks and stop; queued but
    /// unstarted tasks are dropped, which resolves their completion
    /// receivers.
    pub async fn stop(&mut self) {
        debug!("stopping download workers");
        self.handle.shutdown.cancel();
        for worker in self.workers.drain(..) {
            let _ = worker.await;
        }
    }

    async fn worker(
        index: usize,
        receiver: Arc<Mutex<mpsc::UnboundedReceiver<DownloadTask>>>,
        handle: QueueHandle,
        ledger: Arc<Ledger>,
    ) {
        debug!("download worker {index} started");

        loop {
            let task = {
                let mut receiver = receiver.lock().await;
                tokio::select! {
                    // Prioritize shutdown over new work.
                    biased;

                    () = handle.shutdown.cancelled() => break,
                    task = receiver.recv() => match task {
                        Some(task) => task,
                        None => break,
                    },
                }
            };

            Self::process(index, task, &handle, &ledger).await;
        }

        debug!("download worker {index} stopped");
    }

    /// Runs one task to a terminal state or re-queues it.
    async fn process(index: usize, mut task: DownloadTask, handle: &QueueHandle, ledger: &Ledger) {
        debug!("worker {index} processing {}", task.descriptor);

        let outcome = match task.pending.resolve().await {
            Ok(Some(mut media)) => media.rip().await,
            Ok(None) => {
                // Skipped: already downloaded, filtered, or recorded by
                // the resolver.
                task.signal_done();
                return;
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                debug!("worker {index} completed {}", task.descriptor);
                task.signal_done();
            }
            Err(e) if e.kind == crate::error::ErrorKind::Cancelled => {
                info!("{} cancelled", task.descriptor);
                task.signal_done();
            }
            Err(e) if e.is_retryable() && task.retry_count < MAX_RETRIES => {
                task.retry_count += 1;
                info!(
                    "{} failed ({e}), retrying (attempt {}/{MAX_RETRIES})",
                    task.descriptor, task.retry_count
                );
                tokio::time::sleep(Duration::from_secs(u64::from(task.retry_count) * 2)).await;

                if handle.sender.send(task).is_err() {
                    debug!("queue closed during retry");
                }
            }
            Err(e) => {
                error!("{} failed permanently: {e}", task.descriptor);
                if e.kind != crate::error::ErrorKind::Parse {
                    let reason = e.to_string();
                    if let Err(db_err) = ledger
                        .mark_failed(
                            task.source,
                            MediaKind::Track,
                            &task.track_id,
                            Some(&reason),
                        )
                        .await
                    {
                        warn!("could not record failure: {db_err}");
                    }
                }
                handle.stats.failed.fetch_add(1, Ordering::Relaxed);
                task.signal_done();
            }
        }
    }
}
