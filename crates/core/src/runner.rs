//! Background work dispatch for plugins.
//!
//! Lifecycle hooks run on the host's main thread; anything slow (SQL, table
//! setup) is handed to the shared [`AsyncRunner`] instead.

use crate::plugin::lifecycle::panic_message;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tokio::task::{AbortHandle, JoinError, JoinHandle};

/// A cancellable piece of scheduled background work.
pub trait TaskHandle: Send + Sync {
    fn cancel(&self);

    fn is_finished(&self) -> bool;
}

impl TaskHandle for AbortHandle {
    fn cancel(&self) {
        self.abort();
    }

    fn is_finished(&self) -> bool {
        AbortHandle::is_finished(self)
    }
}

/// Async runner errors
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Failed to build async runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("Worker thread count must be at least 1")]
    NoWorkers,
}

/// Result of [`AsyncRunner::run_async`].
///
/// Resolves to the closure's result. A panicking or cancelled closure resolves
/// to an error as well.
pub struct AsyncTask<T> {
    join: JoinHandle<anyhow::Result<T>>,
}

impl<T> AsyncTask<T> {
    pub fn abort_handle(&self) -> AbortHandle {
        self.join.abort_handle()
    }
}

impl<T> From<JoinHandle<anyhow::Result<T>>> for AsyncTask<T> {
    fn from(join: JoinHandle<anyhow::Result<T>>) -> Self {
        Self { join }
    }
}

impl<T> Future for AsyncTask<T> {
    type Output = anyhow::Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.join).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(err)) => Poll::Ready(Err(join_error(err))),
        }
    }
}

fn join_error(err: JoinError) -> anyhow::Error {
    if err.is_cancelled() {
        return anyhow::anyhow!("asynchronous task was cancelled");
    }

    anyhow::anyhow!("asynchronous task panicked: {}", panic_message(err.into_panic()))
}

/// Shared dispatcher for background work, backed by a multi-threaded tokio runtime.
pub struct AsyncRunner {
    handle: Handle,
    runtime: Mutex<Option<Runtime>>,
}

impl AsyncRunner {
    pub fn new(worker_threads: usize) -> Result<Self, RunnerError> {
        if worker_threads == 0 {
            return Err(RunnerError::NoWorkers);
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .thread_name("mvutil-async")
            .enable_all()
            .build()?;

        tracing::debug!("Async runner started with {} worker threads", worker_threads);

        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
        })
    }

    /// Runs a blocking closure off the main thread.
    pub fn run_async<T, F>(&self, f: F) -> AsyncTask<T>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        AsyncTask::from(self.handle.spawn_blocking(f))
    }

    /// Runs a blocking closure off the main thread and logs its failure.
    pub fn run_logged<F>(&self, what: impl Into<String>, f: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let what = what.into();
        let task = self.run_async(f);
        self.handle.spawn(async move {
            if let Err(err) = task.await {
                tracing::warn!(task = %what, "Exception in asynchronous task: {err:#}");
            }
        });
    }

    /// Spawns a future and returns a handle that cancels it.
    pub fn spawn<F>(&self, future: F) -> AbortHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future).abort_handle()
    }

    /// Blocks the calling thread until `future` completes.
    ///
    /// Must not be called from within the runner's own tasks.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }

    pub fn is_shut_down(&self) -> bool {
        self.runtime.lock().is_none()
    }

    /// Stops the runner, waiting at most `grace` for outstanding work.
    ///
    /// Work still running after the grace period is abandoned. Calling this
    /// more than once is a no-op.
    pub fn shutdown(&self, grace: Duration) {
        let runtime = self.runtime.lock().take();
        if let Some(runtime) = runtime {
            tracing::debug!("Shutting down async runner (grace period {:?})", grace);
            runtime.shutdown_timeout(grace);
        }
    }
}
