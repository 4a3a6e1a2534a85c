//! Worker pool retry and completion-signalling behavior.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use ripstream::{
    client::Source,
    db::Ledger,
    error::{Error, Result},
    media::{Media, Pending},
    queue::WorkerPool,
};

/// A pending that fails every resolution with the given error kind.
struct FailingPending {
    attempts: Arc<AtomicUsize>,
    transport: bool,
}

#[async_trait]
impl Pending for FailingPending {
    async fn resolve(&self) -> Result<Option<Box<dyn Media>>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.transport {
            Err(Error::transport("connection reset"))
        } else {
            Err(Error::tagging("cover too weird"))
        }
    }
}

/// A pending that resolves into a media doing nothing.
struct NoopPending {
    attempts: Arc<AtomicUsize>,
}

struct NoopMedia;

#[async_trait]
impl Media for NoopMedia {
    async fn preprocess(&mut self) -> Result<()> {
        Ok(())
    }
    async fn download(&mut self) -> Result<()> {
        Ok(())
    }
    async fn postprocess(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Pending for NoopPending {
    async fn resolve(&self) -> Result<Option<Box<dyn Media>>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Box::new(NoopMedia)))
    }
}

#[tokio::test(start_paused = true)]
async fn transport_failures_retry_three_times_then_fail() {
    let mut pool = WorkerPool::new(1, Arc::new(Ledger::dummy()), CancellationToken::new());
    let handle = pool.handle();
    pool.start(1);

    let attempts = Arc::new(AtomicUsize::new(0));
    let completion = handle.submit(
        Box::new(FailingPending {
            attempts: Arc::clone(&attempts),
            transport: true,
        }),
        "track 1".to_string(),
        Source::Deezer,
        "1".to_string(),
    );

    completion.await.unwrap();
    pool.stop().await;

    // Initial attempt plus three queue retries.
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    assert_eq!(handle.stats().failed(), 1);
    assert_eq!(handle.stats().total(), 1);
}

#[tokio::test(start_paused = true)]
async fn terminal_failures_are_not_retried() {
    let mut pool = WorkerPool::new(1, Arc::new(Ledger::dummy()), CancellationToken::new());
    let handle = pool.handle();
    pool.start(1);

    let attempts = Arc::new(AtomicUsize::new(0));
    let completion = handle.submit(
        Box::new(FailingPending {
            attempts: Arc::clone(&attempts),
            transport: false,
        }),
        "track 1".to_string(),
        Source::Deezer,
        "1".to_string(),
    );

    completion.await.unwrap();
    pool.stop().await;

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(handle.stats().failed(), 1);
}

#[tokio::test(start_paused = true)]
async fn successful_tasks_signal_completion_once() {
    let mut pool = WorkerPool::new(2, Arc::new(Ledger::dummy()), CancellationToken::new());
    let handle = pool.handle();
    pool.start(2);

    let attempts = Arc::new(AtomicUsize::new(0));
    let completions: Vec<_> = (0..5)
        .map(|i| {
            handle.submit(
                Box::new(NoopPending {
                    attempts: Arc::clone(&attempts),
                }),
                format!("track {i}"),
                Source::Deezer,
                i.to_string(),
            )
        })
        .collect();

    for completion in completions {
        completion.await.unwrap();
    }
    pool.stop().await;

    assert_eq!(attempts.load(Ordering::SeqCst), 5);
    assert_eq!(handle.stats().failed(), 0);
    assert_eq!(handle.stats().total(), 5);
}
