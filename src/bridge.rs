//! Single serialized execution context for chat-platform operations.
//!
//! HTTP handlers never touch the platform client directly. They submit a task
//! to the [`ExecutionBridge`], whose one worker runs tasks one at a time to
//! completion and hands each result back over a oneshot channel.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

use crate::platform::ChatPlatform;

type Job = Box<dyn FnOnce(Arc<dyn ChatPlatform>) -> BoxFuture<'static, ()> + Send>;

const QUEUE_DEPTH: usize = 64;

/// Handle to the worker that owns the platform client
#[derive(Clone)]
pub struct ExecutionBridge {
    tx: mpsc::Sender<Job>,
    initialized: Arc<AtomicBool>,
    submitted: Arc<AtomicU64>,
}

impl ExecutionBridge {
    /// Spawn the worker on the current tokio runtime.
    pub fn start(platform: Arc<dyn ChatPlatform>) -> Self {
        let (tx, mut rx) = mpsc::channel::<Job>(QUEUE_DEPTH);

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                // A panicking task drops its reply sender; the caller sees the abort.
                if AssertUnwindSafe(job(platform.clone()))
                    .catch_unwind()
                    .await
                    .is_err()
                {
                    error!("Bridge task panicked");
                }
            }
            info!("Execution bridge stopped");
        });

        Self {
            tx,
            initialized: Arc::new(AtomicBool::new(false)),
            submitted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Initialize the platform client once. Later calls return immediately.
    ///
    /// The check and the initialization run as one bridge task, so concurrent
    /// callers queue behind the first and observe its outcome. A failed
    /// initialization leaves the flag unset for the next caller to retry.
    pub async fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }

        let flag = self.initialized.clone();
        self.run(move |platform| async move {
            if flag.load(Ordering::Acquire) {
                return Ok(());
            }
            platform.initialize().await?;
            flag.store(true, Ordering::Release);
            info!("Chat platform client initialized");
            Ok(())
        })
        .await
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Run a task on the bridge worker and wait for its result.
    pub async fn run<F, Fut, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn ChatPlatform>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (job, reply) = Self::package(task);
        self.tx
            .send(job)
            .await
            .map_err(|_| anyhow!("Execution bridge is not running"))?;
        self.submitted.fetch_add(1, Ordering::Relaxed);

        reply
            .await
            .map_err(|_| anyhow!("Bridge task aborted before completing"))?
    }

    /// Like [`run`](Self::run), for callers on a thread outside the runtime.
    ///
    /// Blocks the calling thread until the task finishes. Panics if called
    /// from within an async context.
    #[allow(dead_code)]
    pub fn run_blocking<F, Fut, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn ChatPlatform>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (job, reply) = Self::package(task);
        self.tx
            .blocking_send(job)
            .map_err(|_| anyhow!("Execution bridge is not running"))?;
        self.submitted.fetch_add(1, Ordering::Relaxed);

        reply
            .blocking_recv()
            .map_err(|_| anyhow!("Bridge task aborted before completing"))?
    }

    /// Number of tasks accepted by the worker so far
    #[cfg(test)]
    pub fn tasks_submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    fn package<F, Fut, T>(task: F) -> (Job, oneshot::Receiver<Result<T>>)
    where
        F: FnOnce(Arc<dyn ChatPlatform>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |platform| {
            async move {
                let result = task(platform).await;
                // The caller may have gone away; the task still ran to completion.
                let _ = reply_tx.send(result);
            }
            .boxed()
        });
        (job, reply_rx)
    }
}
